use anyhow::Result;
use async_trait::async_trait;

/// Source of the single temperature reading used by the control loop.
#[async_trait]
pub trait TemperatureSensor: Send + Sync {
    /// Reads the current temperature in degrees Celsius.
    async fn read_temperature(&self) -> Result<f32>;

    fn key(&self) -> String;
}
