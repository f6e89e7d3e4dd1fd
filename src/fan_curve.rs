//! Temperature to fan speed policy.
//!
//! A two-threshold linear curve: off below the fanless threshold, full speed
//! above the throttle threshold, and a straight line in between. The thresholds
//! live in [`ThermalSettings`], which can be adjusted while the control loop is
//! running.

use std::sync::atomic::{AtomicU32, Ordering};

use log::info;

use crate::error::ThermalError;

/// Highest accepted value for either threshold.
pub const MAX_THRESHOLD_TEMP: f32 = 80.0;

/// Lowest accepted value for either threshold.
pub const MIN_THRESHOLD_TEMP: f32 = 0.0;

pub const DEFAULT_MAX_FANLESS_TEMP: f32 = 60.0;
pub const DEFAULT_MAX_FAN_TEMP: f32 = 80.0;

/// Which branch of the curve a temperature fell into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveRegion {
    Fanless,
    Linear,
    Throttle,
}

/// Immutable snapshot of the curve thresholds.
///
/// # Example
///
/// ```
/// use mk2_fand::fan_curve::LinearCurve;
///
/// let curve = LinearCurve { fanless_max_temp: 60.0, max_fan_temp: 80.0 };
/// assert_eq!(curve.speed_for(70.0), 50.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCurve {
    /// Highest temperature at which the fan stays off.
    pub fanless_max_temp: f32,
    /// Temperature above which the fan is forced to full speed.
    pub max_fan_temp: f32,
}

impl LinearCurve {
    /// Classifies a temperature.
    ///
    /// The boundaries themselves fall into the linear branch, where they
    /// evaluate to exactly 0 and 100.
    pub fn region(&self, temp: f32) -> CurveRegion {
        if temp < self.fanless_max_temp {
            CurveRegion::Fanless
        } else if temp > self.max_fan_temp {
            CurveRegion::Throttle
        } else {
            CurveRegion::Linear
        }
    }

    /// Target speed percentage for `temp`.
    pub fn speed_for(&self, temp: f32) -> f32 {
        match self.region(temp) {
            CurveRegion::Fanless => 0.0,
            CurveRegion::Throttle => 100.0,
            CurveRegion::Linear => {
                let speed_const = 100.0 / (self.max_fan_temp - self.fanless_max_temp);
                speed_const * (temp - self.fanless_max_temp)
            }
        }
    }
}

impl Default for LinearCurve {
    fn default() -> Self {
        Self {
            fanless_max_temp: DEFAULT_MAX_FANLESS_TEMP,
            max_fan_temp: DEFAULT_MAX_FAN_TEMP,
        }
    }
}

/// Curve thresholds shared between the control loop and configuration updates.
///
/// The fanless threshold is stored as the bit pattern of an `f32`, so a reader
/// observes either the previous or the new value in full. The throttle
/// threshold is fixed for the lifetime of the settings.
#[derive(Debug)]
pub struct ThermalSettings {
    fanless_max_temp: AtomicU32,
    max_fan_temp: f32,
}

impl ThermalSettings {
    /// Creates settings after checking both thresholds.
    pub fn new(fanless_max_temp: f32, max_fan_temp: f32) -> Result<Self, ThermalError> {
        check_range(max_fan_temp)?;
        check_range(fanless_max_temp)?;
        if fanless_max_temp >= max_fan_temp {
            return Err(ThermalError::ConfigRejected {
                value: fanless_max_temp,
                reason: "fanless temp must be below the max fan temp",
            });
        }

        Ok(Self {
            fanless_max_temp: AtomicU32::new(fanless_max_temp.to_bits()),
            max_fan_temp,
        })
    }

    pub fn fanless_max_temp(&self) -> f32 {
        f32::from_bits(self.fanless_max_temp.load(Ordering::Acquire))
    }

    pub fn max_fan_temp(&self) -> f32 {
        self.max_fan_temp
    }

    /// Returns a consistent snapshot of the thresholds for one control tick.
    pub fn curve(&self) -> LinearCurve {
        LinearCurve {
            fanless_max_temp: self.fanless_max_temp(),
            max_fan_temp: self.max_fan_temp,
        }
    }

    /// Sets the temperature at which the fan starts running.
    ///
    /// Recommended values are 30.0-60.0. Values above 80C, below 0C, or not
    /// below the throttle threshold are rejected and the current value stays.
    pub fn set_min_fan_temp(&self, new_temp: f32) -> Result<(), ThermalError> {
        if new_temp > MAX_THRESHOLD_TEMP {
            return Err(ThermalError::ConfigRejected {
                value: new_temp,
                reason: "fan runs at maximum speed at 80C; min temp must be lower",
            });
        }
        if new_temp < MIN_THRESHOLD_TEMP {
            return Err(ThermalError::ConfigRejected {
                value: new_temp,
                reason: "requested temperature is below operating range; min temp must be more than 0C",
            });
        }
        if !new_temp.is_finite() {
            return Err(ThermalError::ConfigRejected {
                value: new_temp,
                reason: "min temp must be a finite number",
            });
        }
        if new_temp >= self.max_fan_temp {
            return Err(ThermalError::ConfigRejected {
                value: new_temp,
                reason: "min temp must be below the max fan temp",
            });
        }

        info!("Set fan to turn on at {new_temp}C");
        self.fanless_max_temp
            .store(new_temp.to_bits(), Ordering::Release);
        Ok(())
    }
}

impl Default for ThermalSettings {
    fn default() -> Self {
        Self {
            fanless_max_temp: AtomicU32::new(DEFAULT_MAX_FANLESS_TEMP.to_bits()),
            max_fan_temp: DEFAULT_MAX_FAN_TEMP,
        }
    }
}

fn check_range(value: f32) -> Result<(), ThermalError> {
    if (MIN_THRESHOLD_TEMP..=MAX_THRESHOLD_TEMP).contains(&value) {
        Ok(())
    } else {
        Err(ThermalError::ConfigRejected {
            value,
            reason: "thresholds must be within 0C..=80C",
        })
    }
}
