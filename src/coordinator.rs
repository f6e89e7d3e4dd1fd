//! System coordinator for managing service lifecycle and dependency injection.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::signal::unix::{SignalKind, signal};

use crate::{
    app_context::AppState,
    config::ConfigManager,
    providers::{ConfigWatcherServiceProvider, ServiceProvider, ThermalControlServiceProvider},
    task_manager::TaskManager,
};

/// SystemCoordinator with provider-based service startup.
///
/// Builds the shared [`AppState`], starts services in priority order and
/// stops them all when the process is asked to terminate.
///
/// # Features
/// - Service prioritization (critical vs non-critical)
/// - Graceful degradation on non-critical service failures
/// - Fan left off on every shutdown path
pub struct SystemCoordinator {
    task_manager: TaskManager,
    shared_state: Option<Arc<AppState>>,
    service_providers: Vec<Box<dyn ServiceProvider>>,
}

impl Default for SystemCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCoordinator {
    /// Creates an empty coordinator.
    pub fn new() -> Self {
        Self {
            task_manager: TaskManager::new(),
            shared_state: None,
            service_providers: Vec::new(),
        }
    }

    /// Runs the complete daemon lifecycle: start services, then wait for a signal.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use mk2_fand::{config::ConfigManager, coordinator::SystemCoordinator};
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let config_manager = ConfigManager::load(None).await?;
    /// SystemCoordinator::new().run(config_manager).await
    /// # }
    /// ```
    pub async fn run(&mut self, config_manager: ConfigManager) -> Result<()> {
        self.start(config_manager).await?;
        self.run_main_loop().await
    }

    /// Initializes and starts every service.
    ///
    /// If a critical service fails to start, whatever did start is stopped
    /// before the error is returned.
    pub async fn start(&mut self, config_manager: ConfigManager) -> Result<()> {
        self.initialize(config_manager).await?;
        self.start_or_rollback().await
    }

    async fn start_or_rollback(&mut self) -> Result<()> {
        if let Err(e) = self.start_all_services().await {
            self.shutdown().await;
            return Err(e);
        }
        Ok(())
    }

    /// Builds the application state from configuration and registers services.
    pub async fn initialize(&mut self, config_manager: ConfigManager) -> Result<()> {
        info!("Initializing SystemCoordinator...");

        let state = AppState::new(config_manager)
            .await
            .context("Failed to initialize application state")?;

        self.initialize_with_state(Arc::new(state));
        Ok(())
    }

    /// Registers services around an already built state.
    pub fn initialize_with_state(&mut self, state: Arc<AppState>) {
        info!(
            "Reading {} and driving fan with thresholds {}/{} C",
            state.sensor.key(),
            state.settings.fanless_max_temp(),
            state.settings.max_fan_temp()
        );

        if state.safety_pin.is_none() {
            warn!("No safety_gpio configured; shutdown relies on the duty-cycle write alone");
        }

        self.register_service_providers(state.clone());
        self.shared_state = Some(state);

        info!("SystemCoordinator initialization completed");
    }

    fn register_service_providers(&mut self, state: Arc<AppState>) {
        let mut providers: Vec<Box<dyn ServiceProvider>> = vec![
            Box::new(ThermalControlServiceProvider::new(state.clone())),
            Box::new(ConfigWatcherServiceProvider::new(state)),
        ];

        providers.sort_by_key(|b| std::cmp::Reverse(b.priority()));
        self.service_providers = providers;

        info!(
            "Registered {} service providers in priority order",
            self.service_providers.len()
        );
    }

    /// Starts all registered services in priority order.
    ///
    /// Critical services must start successfully, while non-critical services
    /// can fail without stopping the system.
    pub async fn start_all_services(&mut self) -> Result<()> {
        info!(
            "Starting {} services in priority order...",
            self.service_providers.len()
        );

        for provider in &self.service_providers {
            let is_critical = provider.is_critical();

            match provider.start(&mut self.task_manager).await {
                Ok(()) => {
                    info!(
                        "Service '{}' started successfully (priority: {}, critical: {})",
                        provider.name(),
                        provider.priority(),
                        is_critical
                    );
                }
                Err(e) if is_critical => {
                    return Err(e).with_context(|| {
                        format!("Critical service '{}' failed to start", provider.name())
                    });
                }
                Err(e) => {
                    warn!(
                        "Non-critical service '{}' failed to start: {}",
                        provider.name(),
                        e
                    );
                }
            }
        }

        info!("All critical services started successfully");
        Ok(())
    }

    /// Waits for SIGINT or SIGTERM, then shuts everything down.
    pub async fn run_main_loop(&mut self) -> Result<()> {
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        info!("Daemon running, waiting for termination signal");

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for shutdown signal")?;
                info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }

        self.shutdown().await;
        info!("Main loop terminated");
        Ok(())
    }

    /// Stops every service. The control loop turns the fan off on its way out.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&mut self) {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.task_manager.shutdown_all().await {
            error!("Error during task shutdown: {e:#}");
        }

        info!("Shutdown complete");
    }

    /// Shared state, once initialized.
    pub fn state(&self) -> Option<&Arc<AppState>> {
        self.shared_state.as_ref()
    }

    /// Names of registered services in start order.
    pub fn registered_services(&self) -> Vec<&'static str> {
        self.service_providers.iter().map(|p| p.name()).collect()
    }

    /// Number of services currently running.
    pub fn running_count(&self) -> usize {
        self.task_manager.active_count()
    }
}
