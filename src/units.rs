//! Conversion between the 0-100 software speed domain and the fan's duty cycle.
//!
//! The two directions are intentionally asymmetric: software to hardware
//! truncates, hardware to software rounds. A round trip can therefore drift by
//! up to one percent, which the hardware never notices.

/// Native fan command value.
pub type DutyCycle = u8;

pub const HW_MIN: DutyCycle = 0;
pub const HW_MAX: DutyCycle = 255;
pub const SW_MIN: f32 = 0.0;
pub const SW_MAX: f32 = 100.0;

/// Converts a speed percentage into a duty cycle, truncating toward zero.
///
/// Out-of-range input is clamped first, so `to_hardware(150.0) == 255` and
/// `to_hardware(-3.0) == 0`.
///
/// # Example
///
/// ```
/// use mk2_fand::units::to_hardware;
///
/// assert_eq!(to_hardware(50.0), 127);
/// assert_eq!(to_hardware(100.0), 255);
/// ```
pub fn to_hardware(percent: f32) -> DutyCycle {
    let clamped = f64::from(percent.clamp(SW_MIN, SW_MAX)) - f64::from(SW_MIN);
    let hw_steps = f64::from(HW_MAX - HW_MIN);
    let sw_steps = f64::from(SW_MAX - SW_MIN);

    // Multiply before dividing so 100% lands on exactly 255.0.
    (clamped * hw_steps / sw_steps) as DutyCycle + HW_MIN
}

/// Converts a duty cycle back into a speed percentage rounded to a whole number.
///
/// Accepts any integer so out-of-range readings clamp instead of wrapping.
pub fn to_percent(hw: i32) -> f32 {
    let clamped = hw.clamp(i32::from(HW_MIN), i32::from(HW_MAX)) - i32::from(HW_MIN);
    let hw_steps = f64::from(HW_MAX - HW_MIN);
    let sw_steps = f64::from(SW_MAX - SW_MIN);

    ((f64::from(clamped) * sw_steps / hw_steps).round() as f32) + SW_MIN
}
