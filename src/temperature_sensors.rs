pub mod thermal_zone;

use std::sync::Arc;

use crate::{config::SensorCfg, sensors::TemperatureSensor};

/// Builds the temperature source described by the configuration.
pub fn from_config(cfg: &SensorCfg) -> Arc<dyn TemperatureSensor> {
    match cfg {
        SensorCfg::ThermalZone { path } => Arc::new(thermal_zone::ThermalZoneSensor::new(path)),
    }
}
