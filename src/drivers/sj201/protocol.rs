use crate::units::DutyCycle;

/// Register of the SJ201 rev6 fan controller accepting the duty cycle.
pub const FAN_SPEED_REGISTER: u8 = 101;
pub const DEFAULT_ADDRESS: u8 = 0x04;
pub const DEFAULT_BUS: u8 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    SetFanSpeed { register: u8, duty: DutyCycle },
}

impl Command {
    /// Arguments for `i2cset`, forcing access (`-a`) without prompting (`-y`).
    pub fn to_args(&self, bus: u8, address: u8) -> Vec<String> {
        match *self {
            Command::SetFanSpeed { register, duty } => vec![
                "-a".into(),
                "-y".into(),
                bus.to_string(),
                format!("0x{address:02x}"),
                register.to_string(),
                duty.to_string(),
                "i".into(),
            ],
        }
    }
}
