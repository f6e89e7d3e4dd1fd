use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;

use crate::fan_controller::SafetyPin;

pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Fan enable line exported through the legacy sysfs GPIO interface.
///
/// The pin must already be exported and configured as an output.
#[derive(Debug, Clone)]
pub struct SysfsGpioPin {
    value_path: PathBuf,
}

impl SysfsGpioPin {
    pub fn new(gpio: u32) -> Self {
        Self::with_root(SYSFS_GPIO_ROOT, gpio)
    }

    pub fn with_root(root: impl AsRef<Path>, gpio: u32) -> Self {
        Self {
            value_path: root.as_ref().join(format!("gpio{gpio}")).join("value"),
        }
    }
}

#[async_trait]
impl SafetyPin for SysfsGpioPin {
    async fn force_off(&self) -> Result<()> {
        info!("Forcing fan line low at {}", self.value_path.display());
        tokio::fs::write(&self.value_path, b"0\n")
            .await
            .with_context(|| format!("writing {}", self.value_path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn force_off_writes_low_level() {
        let root = tempdir().unwrap();
        std::fs::create_dir(root.path().join("gpio13")).unwrap();
        std::fs::write(root.path().join("gpio13/value"), "1\n").unwrap();

        let pin = SysfsGpioPin::with_root(root.path(), 13);
        pin.force_off().await.unwrap();

        let value = std::fs::read_to_string(root.path().join("gpio13/value")).unwrap();
        assert_eq!(value.trim(), "0");
    }

    #[tokio::test]
    async fn unexported_pin_is_an_error() {
        let root = tempdir().unwrap();
        let pin = SysfsGpioPin::with_root(root.path(), 21);

        let err = pin.force_off().await.unwrap_err();
        assert!(format!("{err:#}").contains("gpio21"));
    }
}
