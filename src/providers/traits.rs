use anyhow::Result;
use async_trait::async_trait;

use crate::task_manager::TaskManager;

/// Trait for services that can be started through TaskManager.
///
/// Stopping goes through the same TaskManager: the task's cancellation token
/// is the stop signal.
///
/// # Example
///
/// ```no_run
/// use mk2_fand::providers::traits::ServiceProvider;
/// use mk2_fand::task_manager::TaskManager;
/// use anyhow::Result;
///
/// struct ExampleService;
///
/// #[async_trait::async_trait]
/// impl ServiceProvider for ExampleService {
///     async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
///         task_manager.spawn_task("example".to_string(), |token| async move {
///             token.cancelled().await;
///             Ok(())
///         }).await
///     }
///
///     fn name(&self) -> &'static str { "ExampleService" }
///     fn priority(&self) -> i32 { 5 }
///     fn is_critical(&self) -> bool { false }
/// }
/// ```
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// Starts the service in TaskManager.
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()>;

    /// Returns service name for logging and management.
    fn name(&self) -> &'static str;

    /// Returns startup priority (higher numbers start first).
    fn priority(&self) -> i32 {
        0
    }

    /// Indicates if service is critical for system operation.
    fn is_critical(&self) -> bool {
        false
    }
}
