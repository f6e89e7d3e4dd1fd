//! Hardware drivers for the fan actuator.

pub mod sj201;

use std::sync::Arc;

use crate::{
    config::FanCfg,
    fan_controller::{DutyCycleChannel, SafetyPin},
};

/// Builds the duty-cycle channel and optional safety pin described by the configuration.
pub fn from_config(cfg: &FanCfg) -> (Arc<dyn DutyCycleChannel>, Option<Arc<dyn SafetyPin>>) {
    match cfg {
        FanCfg::Sj201I2c {
            bus,
            address,
            register,
            safety_gpio,
        } => {
            let channel: Arc<dyn DutyCycleChannel> =
                Arc::new(sj201::I2cSetChannel::new(*bus, *address, *register));
            let pin = safety_gpio
                .map(|gpio| Arc::new(sj201::SysfsGpioPin::new(gpio)) as Arc<dyn SafetyPin>);
            (channel, pin)
        }
    }
}
