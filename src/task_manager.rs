//! Task management for async service lifecycle.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Manages async tasks with proper lifecycle and error handling.
///
/// Every task receives a child of the global cancellation token, so a single
/// task can be stopped by name or all of them at once.
pub struct TaskManager {
    tasks: HashMap<String, TaskInfo>,
    pub global_token: CancellationToken,
}

impl TaskManager {
    /// Creates a new TaskManager.
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            global_token: CancellationToken::new(),
        }
    }

    /// Spawns and registers a task with the given name.
    ///
    /// The task will be tracked and can be shut down gracefully.
    pub async fn spawn_task<F, Fut>(&mut self, name: String, task_fn: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        if self.tasks.contains_key(&name) {
            anyhow::bail!("Task '{}' is already running", name);
        }

        let task_token = self.global_token.child_token();
        let task_token_clone = task_token.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            info!("Starting task: {}", task_name);
            match task_fn(task_token_clone).await {
                Ok(()) => {
                    info!("Task '{}' completed successfully", task_name);
                    Ok(())
                }
                Err(e) => {
                    error!("Task '{}' failed: {}", task_name, e);
                    Err(e)
                }
            }
        });

        self.tasks.insert(
            name.clone(),
            TaskInfo {
                handle,
                cancel_token: task_token,
            },
        );

        info!("Task '{}' spawned", name);
        Ok(())
    }

    /// Stops a single task and waits for it to finish.
    ///
    /// Stopping a task that is not running is a no-op.
    pub async fn stop_task(&mut self, name: &str) -> Result<()> {
        let Some(info) = self.tasks.remove(name) else {
            return Ok(());
        };

        info!("Stopping task '{}'", name);
        info.cancel_token.cancel();
        join_with_timeout(info.handle)
            .await
            .with_context(|| format!("Task '{name}' did not stop cleanly"))
    }

    /// Shuts down all registered tasks gracefully.
    ///
    /// Waits for all tasks to complete and collects any errors.
    /// Returns the first error encountered, if any. Calling it again once
    /// everything has stopped does nothing.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        info!("Stopping all {} tasks", self.tasks.len());

        self.global_token.cancel();

        let mut first_error = None;
        let handles: Vec<_> = self.tasks.drain().map(|(_, info)| info.handle).collect();

        for handle in handles {
            if let Err(e) = join_with_timeout(handle).await {
                warn!("Task failed during shutdown: {}", e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        if let Some(error) = first_error {
            Err(error).context("One or more tasks failed during shutdown")
        } else {
            info!("All tasks stopped");
            Ok(())
        }
    }

    /// Returns the count of active tasks.
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    /// Checks if a task with the given name is currently registered.
    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

struct TaskInfo {
    handle: JoinHandle<Result<()>>,
    cancel_token: CancellationToken,
}

/// Waits for a task, aborting it if it outlives the shutdown timeout.
async fn join_with_timeout(mut handle: JoinHandle<Result<()>>) -> Result<()> {
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            let error = anyhow::anyhow!("Task panicked: {}", e);
            error!("{}", error);
            Err(error)
        }
        Err(_) => {
            handle.abort();
            // Wait for the cancelled future to be dropped so its resources are released.
            let _ = handle.await;
            let error = anyhow::anyhow!("Task shutdown timeout exceeded, task aborted");
            error!("{}", error);
            Err(error)
        }
    }
}
