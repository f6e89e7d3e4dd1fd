//! # mk2_fand
//!
//! A Linux daemon that keeps the Mark II SJ201 board fan matched to CPU temperature.
//!
//! ## Features
//!
//! - **Async Architecture**: Built on Tokio, one task per service
//! - **Temperature Monitoring**: Reads the Linux thermal zone
//! - **Fan Control**: Piecewise linear curve with fanless and throttle regions
//! - **Hot Reload**: The fan start temperature follows config changes without restart
//! - **Safe Shutdown**: The fan is stopped and its enable line pulled low on exit
//!
//! ## Architecture
//!
//! - [`SystemCoordinator`](coordinator::SystemCoordinator) - Main lifecycle manager
//! - [`AppState`](app_context::AppState) - Shared hardware and settings
//! - [`ThermalControlLoop`](controller::ThermalControlLoop) - Periodic sense and act cycle
//! - [`FanActuator`](fan_controller::FanActuator) - Speed bookkeeping over a duty-cycle channel
//! - [`units`] - Percent and duty-cycle conversion
//!
//! ## Example
//!
//! ```no_run
//! use mk2_fand::{config::ConfigManager, coordinator::SystemCoordinator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = ConfigManager::load(None).await?;
//!     SystemCoordinator::new().run(config_manager).await
//! }
//! ```

pub mod app_context;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod drivers;
pub mod error;
pub mod fan_controller;
pub mod fan_curve;
pub mod providers;
pub mod sensors;
pub mod task_manager;
pub mod temperature_sensors;
pub mod units;
