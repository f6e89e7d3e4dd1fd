//! Periodic closed-loop fan control.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use log::{debug, error, info, warn};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::{
    error::ThermalError,
    fan_controller::FanActuator,
    fan_curve::{CurveRegion, ThermalSettings},
    sensors::TemperatureSensor,
};

pub const DEFAULT_TICK: Duration = Duration::from_secs(30);

/// Samples the temperature, maps it through the curve and commands the fan.
///
/// The loop is the only owner of the [`FanActuator`]. It stops cooperatively
/// when its cancellation token fires and drives the fan to a safe state on
/// the way out.
pub struct ThermalControlLoop {
    sensor: Arc<dyn TemperatureSensor>,
    actuator: FanActuator,
    settings: Arc<ThermalSettings>,
    tick: Duration,
}

impl ThermalControlLoop {
    pub fn new(
        sensor: Arc<dyn TemperatureSensor>,
        actuator: FanActuator,
        settings: Arc<ThermalSettings>,
        tick: Duration,
    ) -> Self {
        Self {
            sensor,
            actuator,
            settings,
            tick,
        }
    }

    pub fn actuator(&self) -> &FanActuator {
        &self.actuator
    }

    /// Runs one sample/compute/command iteration and returns the commanded speed.
    ///
    /// A failed sample leaves the fan untouched. A failed write is reported
    /// after the actuator has recorded the new speed.
    pub async fn control_tick(&mut self) -> Result<f32, ThermalError> {
        let current_temp = self
            .sensor
            .read_temperature()
            .await
            .map_err(ThermalError::SampleUnavailable)?;
        debug!("CPU temperature is {current_temp}C");

        let curve = self.settings.curve();
        match curve.region(current_temp) {
            CurveRegion::Fanless => debug!("Temp below {}", curve.fanless_max_temp),
            CurveRegion::Throttle => warn!("Thermal Throttling, temp={current_temp}C"),
            CurveRegion::Linear => debug!("temp={current_temp}"),
        }
        let fan_speed = curve.speed_for(current_temp);

        debug!("Setting fan speed to: {fan_speed}");
        self.actuator.set_speed(fan_speed).await?;
        Ok(fan_speed)
    }

    /// Runs until `cancel` fires, then shuts the actuator down.
    ///
    /// The first tick happens immediately. Cancellation is only observed
    /// between ticks, so an in-flight read or write always completes.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(
            "Temperature monitor started (tick {}s, sensor {})",
            self.tick.as_secs_f32(),
            self.sensor.key()
        );

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _instant = ticker.tick() => {}
            }

            match self.control_tick().await {
                Ok(_) => {}
                Err(e @ ThermalError::SampleUnavailable(_)) => {
                    error!("{e}; skipping this tick");
                }
                Err(e) => error!("{e}"),
            }
        }

        info!("Fan thread received exit signal");
        self.actuator.shutdown().await;
        Ok(())
    }
}
