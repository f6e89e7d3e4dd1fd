//! Service providers started by the coordinator.
//!
//! Each provider owns one long-running task in the [`TaskManager`](crate::task_manager::TaskManager)
//! and shares hardware and settings through [`AppState`](crate::app_context::AppState).

pub mod config_watcher;
pub mod thermal_control;
pub mod traits;

pub use config_watcher::ConfigWatcherServiceProvider;
pub use thermal_control::ThermalControlServiceProvider;
pub use traits::ServiceProvider;
