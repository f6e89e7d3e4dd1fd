//! Error taxonomy for the thermal control path.
//!
//! None of these errors stops the daemon. They are returned to the caller,
//! logged, and the control loop carries on with the next tick.

use thiserror::Error;

use crate::units::DutyCycle;

#[derive(Debug, Error)]
pub enum ThermalError {
    /// A requested threshold is outside the accepted range; the previous value stays.
    #[error("threshold {value}C rejected: {reason}. Setting unchanged")]
    ConfigRejected { value: f32, reason: &'static str },

    /// The temperature source produced no usable reading this tick.
    #[error("temperature sample unavailable: {0:#}")]
    SampleUnavailable(anyhow::Error),

    /// The duty cycle was recorded but the hardware write did not succeed.
    #[error("failed to write duty cycle {duty}: {cause:#}")]
    ActuatorWriteFailed { duty: DutyCycle, cause: anyhow::Error },

    /// The fail-safe action during shutdown did not succeed.
    #[error("fan safety action failed during shutdown: {0:#}")]
    ShutdownActuatorFailed(anyhow::Error),
}
