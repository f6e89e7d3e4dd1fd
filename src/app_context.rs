//! Application state shared between services.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::error;

use crate::{
    config::{Config, ConfigManager},
    drivers,
    fan_controller::{DutyCycleChannel, SafetyPin},
    fan_curve::ThermalSettings,
    sensors::TemperatureSensor,
    temperature_sensors,
};

/// Shared application state containing the hardware seams and live settings.
///
/// The thresholds are the only part that changes after startup; everything
/// else is fixed until the daemon restarts.
pub struct AppState {
    /// Configuration manager for centralized config handling
    pub config_manager: Arc<ConfigManager>,
    /// Curve thresholds, adjustable while the control loop runs
    pub settings: Arc<ThermalSettings>,
    /// CPU temperature source
    pub sensor: Arc<dyn TemperatureSensor>,
    /// Fan duty-cycle channel
    pub channel: Arc<dyn DutyCycleChannel>,
    /// Fan enable line used on shutdown
    pub safety_pin: Option<Arc<dyn SafetyPin>>,
}

impl AppState {
    /// Creates a new AppState with hardware built from the configuration.
    pub async fn new(config_manager: ConfigManager) -> Result<Self> {
        let config = config_manager.clone_config().await;
        let sensor = temperature_sensors::from_config(&config.sensor);
        let (channel, safety_pin) = drivers::from_config(&config.fan);

        Self::with_hardware(config_manager, sensor, channel, safety_pin).await
    }

    /// Creates a new AppState around already constructed hardware.
    pub async fn with_hardware(
        config_manager: ConfigManager,
        sensor: Arc<dyn TemperatureSensor>,
        channel: Arc<dyn DutyCycleChannel>,
        safety_pin: Option<Arc<dyn SafetyPin>>,
    ) -> Result<Self> {
        let config = config_manager.clone_config().await;

        Ok(Self {
            settings: Arc::new(settings_from_config(&config)?),
            sensor,
            channel,
            safety_pin,
            config_manager: Arc::new(config_manager),
        })
    }

    /// Gets the configuration manager.
    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }

    /// Control loop period from the current configuration.
    pub async fn tick(&self) -> Duration {
        Duration::from_secs(u64::from(self.config_manager.get().await.tick_seconds))
    }
}

/// Builds the curve thresholds and applies the optional `min_fan_temp` override.
///
/// A rejected override is logged and the configured fanless threshold is kept.
pub fn settings_from_config(config: &Config) -> Result<ThermalSettings> {
    let settings = ThermalSettings::new(config.max_fanless_temp, config.max_fan_temp)
        .context("Invalid fan curve thresholds")?;

    if let Some(min_fan_temp) = config.min_fan_temp {
        if let Err(e) = settings.set_min_fan_temp(min_fan_temp) {
            error!("{e}");
        }
    }

    Ok(settings)
}
