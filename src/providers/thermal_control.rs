use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    app_context::AppState, controller::ThermalControlLoop, fan_controller::FanActuator,
    providers::traits::ServiceProvider, task_manager::TaskManager,
};

/// Closed-loop fan control service provider.
///
/// Builds a fresh [`FanActuator`] at speed 0 and runs the
/// [`ThermalControlLoop`] in its own task. Cancelling the task stops the loop
/// after the current tick and leaves the fan in its shutdown state.
///
/// # Priority and Criticality
///
/// - **Priority**: 10 (highest)
/// - **Critical**: Yes (the daemon has no purpose without it)
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use mk2_fand::providers::ThermalControlServiceProvider;
/// use mk2_fand::providers::traits::ServiceProvider;
/// use mk2_fand::app_context::AppState;
/// use mk2_fand::task_manager::TaskManager;
///
/// # async fn example(state: Arc<AppState>) -> anyhow::Result<()> {
/// let provider = ThermalControlServiceProvider::new(state);
/// let mut task_manager = TaskManager::new();
/// provider.start(&mut task_manager).await?;
/// task_manager.stop_task(provider.name()).await?;
/// # Ok(())
/// # }
/// ```
pub struct ThermalControlServiceProvider {
    state: Arc<AppState>,
}

impl ThermalControlServiceProvider {
    /// Creates a new thermal control service provider.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ServiceProvider for ThermalControlServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let actuator = FanActuator::new(self.state.channel.clone(), self.state.safety_pin.clone());
        let control_loop = ThermalControlLoop::new(
            self.state.sensor.clone(),
            actuator,
            self.state.settings.clone(),
            self.state.tick().await,
        );

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| {
                control_loop.run(cancel_token)
            })
            .await
    }

    fn name(&self) -> &'static str {
        "ThermalControlService"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_critical(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Config, ConfigManager},
        fan_controller::DutyCycleChannel,
        sensors::TemperatureSensor,
        units::DutyCycle,
    };
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    struct FixedSensor(f32);

    #[async_trait]
    impl TemperatureSensor for FixedSensor {
        async fn read_temperature(&self) -> Result<f32> {
            Ok(self.0)
        }

        fn key(&self) -> String {
            "fixed".to_string()
        }
    }

    #[derive(Default)]
    struct RecordingChannel(Mutex<Vec<DutyCycle>>);

    #[async_trait]
    impl DutyCycleChannel for RecordingChannel {
        async fn write(&self, duty: DutyCycle) -> Result<()> {
            self.0.lock().unwrap().push(duty);
            Ok(())
        }
    }

    async fn create_state(temp: f32, channel: Arc<RecordingChannel>) -> Arc<AppState> {
        let config_manager = ConfigManager::new(Config::default(), "/tmp/test.yml".into());
        Arc::new(
            AppState::with_hardware(config_manager, Arc::new(FixedSensor(temp)), channel, None)
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn provider_metadata() {
        let state = create_state(40.0, Arc::default()).await;
        let provider = ThermalControlServiceProvider::new(state);

        assert_eq!(provider.name(), "ThermalControlService");
        assert_eq!(provider.priority(), 10);
        assert!(provider.is_critical());
    }

    #[tokio::test]
    async fn service_commands_fan_and_stops_cleanly() {
        let channel = Arc::new(RecordingChannel::default());
        let state = create_state(70.0, channel.clone()).await;
        let provider = ThermalControlServiceProvider::new(state);
        let mut task_manager = TaskManager::new();

        provider.start(&mut task_manager).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        assert!(task_manager.is_running("ThermalControlService"));

        timeout(Duration::from_secs(2), task_manager.stop_task(provider.name()))
            .await
            .expect("stop took longer than a tick bound")
            .unwrap();

        assert_eq!(*channel.0.lock().unwrap(), vec![127, 0]);
        assert_eq!(task_manager.active_count(), 0);
    }

    #[tokio::test]
    async fn setter_reaches_running_loop() {
        let channel = Arc::new(RecordingChannel::default());
        let state = create_state(50.0, channel.clone()).await;
        let provider = ThermalControlServiceProvider::new(state.clone());
        let mut task_manager = TaskManager::new();

        state.settings.set_min_fan_temp(45.0).unwrap();
        provider.start(&mut task_manager).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        task_manager.shutdown_all().await.unwrap();

        let writes = channel.0.lock().unwrap().clone();
        assert!(writes[0] > 0, "expected fan on at 50C, got {writes:?}");
        assert_eq!(writes.last(), Some(&0));
    }
}
