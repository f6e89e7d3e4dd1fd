//! Fan on the SJ201 rev6 daughterboard, driven over I2C with `i2cset`.

mod gpio;
mod protocol;

pub use gpio::SysfsGpioPin;
pub use protocol::{Command, DEFAULT_ADDRESS, DEFAULT_BUS, FAN_SPEED_REGISTER};

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use log::debug;
use tokio::process::Command as Process;

use crate::{fan_controller::DutyCycleChannel, units::DutyCycle};

const I2CSET: &str = "i2cset";

/// Upper bound for one `i2cset` run; a hung bus must not hold up the control loop.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Duty-cycle channel that shells out to `i2cset` from i2c-tools.
#[derive(Debug, Clone)]
pub struct I2cSetChannel {
    bus: u8,
    address: u8,
    register: u8,
    program: PathBuf,
    timeout: Duration,
}

impl I2cSetChannel {
    pub fn new(bus: u8, address: u8, register: u8) -> Self {
        Self {
            bus,
            address,
            register,
            program: PathBuf::from(I2CSET),
            timeout: WRITE_TIMEOUT,
        }
    }

    /// Replaces the `i2cset` executable, e.g. with an absolute path.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for I2cSetChannel {
    fn default() -> Self {
        Self::new(DEFAULT_BUS, DEFAULT_ADDRESS, FAN_SPEED_REGISTER)
    }
}

#[async_trait]
impl DutyCycleChannel for I2cSetChannel {
    async fn write(&self, duty: DutyCycle) -> Result<()> {
        let args = Command::SetFanSpeed {
            register: self.register,
            duty,
        }
        .to_args(self.bus, self.address);

        // Dropping the timed-out future drops the child, which kills it.
        let output = tokio::time::timeout(
            self.timeout,
            Process::new(&self.program)
                .args(&args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            anyhow!(
                "{} timed out after {:?}",
                self.program.display(),
                self.timeout
            )
        })?
        .with_context(|| format!("spawning {}", self.program.display()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("out={}", stdout.trim());
        debug!("err={}", stderr.trim());

        if !output.status.success() {
            bail!(
                "{} {} failed ({}): {}",
                self.program.display(),
                args.join(" "),
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}
