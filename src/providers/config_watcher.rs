use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use notify::{Event, EventHandler, RecursiveMode, Watcher, recommended_watcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState, config::ConfigChange, providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

const DEBOUNCE: Duration = Duration::from_millis(2000);

/// Configuration file monitoring service provider.
///
/// Watches the configuration file and, once changes settle, reloads it. A new
/// fan start temperature (`min_fan_temp`, or `max_fanless_temp` when no
/// override is set) is pushed into the running control loop through
/// [`ThermalSettings::set_min_fan_temp`](crate::fan_curve::ThermalSettings::set_min_fan_temp);
/// every other change is reported as needing a restart.
///
/// # Priority and Criticality
///
/// - **Priority**: 6 (medium)
/// - **Critical**: No (optional service)
pub struct ConfigWatcherServiceProvider {
    state: Arc<AppState>,
}

impl ConfigWatcherServiceProvider {
    /// Creates a new configuration watcher service provider.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ServiceProvider for ConfigWatcherServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_config_watcher_service(state, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "ConfigWatcherService"
    }

    fn priority(&self) -> i32 {
        6
    }

    fn is_critical(&self) -> bool {
        false
    }
}

/// Forwards filesystem notifications into the async task.
#[derive(Debug)]
struct AsyncEventHandler {
    sender: mpsc::UnboundedSender<notify::Result<Event>>,
}

impl EventHandler for AsyncEventHandler {
    fn handle_event(&mut self, event: notify::Result<Event>) {
        if let Err(e) = self.sender.send(event) {
            error!("Failed to send filesystem event to async handler: {}", e);
        }
    }
}

async fn run_config_watcher_service(
    state: Arc<AppState>,
    cancel_token: CancellationToken,
) -> Result<()> {
    let config_path = state.config_manager().path().to_path_buf();
    let watch_path = match config_path.parent() {
        Some(parent) if parent.is_dir() => parent.to_path_buf(),
        _ => {
            warn!(
                "Config directory for {} does not exist, hot reload disabled",
                config_path.display()
            );
            return Ok(());
        }
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut watcher = recommended_watcher(AsyncEventHandler { sender: event_tx })?;
    watcher.watch(&watch_path, RecursiveMode::NonRecursive)?;
    info!("Watching {} for config changes", watch_path.display());

    let mut debounce_interval = tokio::time::interval(DEBOUNCE);
    debounce_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut has_pending_event = false;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Config watcher service cancelled");
                break;
            }

            event_result = event_rx.recv() => {
                match event_result {
                    Some(Ok(event)) => {
                        let affects_config = event
                            .paths
                            .iter()
                            .any(|path| path.file_name() == config_path.file_name());
                        let is_relevant_event = event.kind.is_modify() || event.kind.is_create();

                        if affects_config && is_relevant_event {
                            debug!("Config file event {:?}, scheduling reload", event.kind);
                            has_pending_event = true;
                        }
                    }
                    Some(Err(e)) => warn!("Filesystem watcher error: {}", e),
                    None => {
                        warn!("Filesystem event channel closed, exiting");
                        break;
                    }
                }
            }

            _ = debounce_interval.tick(), if has_pending_event => {
                has_pending_event = false;

                match state.config_manager().reload().await {
                    Ok(change) => apply_config_change(&state, &change),
                    Err(e) => error!("Failed to reload configuration: {e:#}"),
                }
            }
        }
    }

    if let Err(e) = watcher.unwatch(&watch_path) {
        warn!("Failed to unwatch path during cleanup: {}", e);
    }

    info!("Config watcher service stopped");
    Ok(())
}

/// Applies the hot-reloadable part of a configuration change.
pub fn apply_config_change(state: &AppState, change: &ConfigChange) {
    if change.is_empty() {
        debug!("Configuration reloaded without relevant changes");
        return;
    }

    if let Some(fan_start_temp) = change.fan_start_temp {
        if let Err(e) = state.settings.set_min_fan_temp(fan_start_temp) {
            error!("{e}");
        }
    }

    if !change.cold_sections.is_empty() {
        warn!(
            "Configuration changes in {:?} require a daemon restart to take effect",
            change.cold_sections
        );
    }
}
