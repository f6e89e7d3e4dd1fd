use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;

use crate::sensors::TemperatureSensor;

pub const DEFAULT_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

/// CPU temperature from a Linux thermal zone, reported in millidegrees.
#[derive(Debug, Clone)]
pub struct ThermalZoneSensor {
    path: PathBuf,
}

impl ThermalZoneSensor {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Default for ThermalZoneSensor {
    fn default() -> Self {
        Self::new(DEFAULT_THERMAL_ZONE)
    }
}

#[async_trait]
impl TemperatureSensor for ThermalZoneSensor {
    fn key(&self) -> String {
        format!("thermal:{}", self.path.display())
    }

    async fn read_temperature(&self) -> Result<f32> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        parse_millidegrees(&raw).with_context(|| format!("parsing {}", self.path.display()))
    }
}

fn parse_millidegrees(raw: &str) -> Result<f32> {
    let milli: f32 = raw
        .trim()
        .parse()
        .map_err(|e| anyhow!("invalid reading {:?}: {e}", raw.trim()))?;
    if !milli.is_finite() {
        return Err(anyhow!("non-finite reading {milli}"));
    }
    Ok(milli / 1000.0)
}
