//! Fan actuator and the hardware seams it writes through.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};

use crate::{
    error::ThermalError,
    units::{self, DutyCycle},
};

/// Hardware channel accepting a raw duty cycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DutyCycleChannel: Send + Sync {
    async fn write(&self, duty: DutyCycle) -> Result<()>;
}

/// Fan enable line used as a last resort during shutdown.
///
/// Pulling the line low makes the board fall back to running the fan, the
/// safe state if the duty-cycle write was not honoured.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SafetyPin: Send + Sync {
    async fn force_off(&self) -> Result<()>;
}

/// Tracks and applies the commanded fan speed.
///
/// Owned by the control loop; the stored duty cycle always reflects the last
/// command, whether or not the hardware accepted it.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use mk2_fand::drivers::sj201::I2cSetChannel;
/// use mk2_fand::fan_controller::FanActuator;
///
/// # async fn example() -> anyhow::Result<()> {
/// let mut fan = FanActuator::new(Arc::new(I2cSetChannel::default()), None);
/// fan.set_speed(50.0).await?;
/// assert_eq!(fan.speed(), 50.0);
/// # Ok(())
/// # }
/// ```
pub struct FanActuator {
    channel: Arc<dyn DutyCycleChannel>,
    safety_pin: Option<Arc<dyn SafetyPin>>,
    duty: DutyCycle,
}

impl FanActuator {
    /// Creates an actuator at speed 0 without touching the hardware.
    pub fn new(channel: Arc<dyn DutyCycleChannel>, safety_pin: Option<Arc<dyn SafetyPin>>) -> Self {
        Self {
            channel,
            safety_pin,
            duty: units::HW_MIN,
        }
    }

    /// Commands a new speed percentage and returns the duty cycle written.
    ///
    /// The duty cycle is recorded before the write, so a failed write still
    /// updates [`speed`](Self::speed).
    pub async fn set_speed(&mut self, percent: f32) -> Result<DutyCycle, ThermalError> {
        let duty = units::to_hardware(percent);
        self.duty = duty;

        debug!("Writing duty cycle {duty} ({percent:.1}%)");
        self.channel
            .write(duty)
            .await
            .map_err(|cause| ThermalError::ActuatorWriteFailed { duty, cause })?;
        Ok(duty)
    }

    /// Last commanded speed as a whole percentage.
    pub fn speed(&self) -> f32 {
        units::to_percent(i32::from(self.duty))
    }

    pub fn duty_cycle(&self) -> DutyCycle {
        self.duty
    }

    /// Stops the fan and forces the enable line to its fail-safe level.
    ///
    /// Never fails: every error is logged and swallowed.
    pub async fn shutdown(&mut self) {
        info!("Shutting down fan actuator");
        if let Err(e) = self.set_speed(0.0).await {
            error!("{e}");
        }

        match &self.safety_pin {
            Some(pin) => {
                if let Err(cause) = pin.force_off().await {
                    warn!("{}", ThermalError::ShutdownActuatorFailed(cause));
                }
            }
            None => warn!("No safety_gpio configured, fan enable line left as is"),
        }
    }
}

impl std::fmt::Debug for FanActuator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanActuator")
            .field("duty", &self.duty)
            .field("safety_pin", &self.safety_pin.is_some())
            .finish()
    }
}
