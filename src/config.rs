//! Configuration management for the mk2_fand daemon.
//!
//! Handles loading, parsing, and validation of the YAML configuration file
//! that defines the fan curve thresholds, the temperature source and the fan
//! hardware.

use crate::{
    drivers::sj201::{DEFAULT_ADDRESS, DEFAULT_BUS, FAN_SPEED_REGISTER},
    fan_curve::{
        DEFAULT_MAX_FAN_TEMP, DEFAULT_MAX_FANLESS_TEMP, MAX_THRESHOLD_TEMP, MIN_THRESHOLD_TEMP,
    },
    temperature_sensors::thermal_zone::DEFAULT_THERMAL_ZONE,
};
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::RwLock;

/// Main configuration structure for the mk2_fand daemon.
///
/// # Example
///
/// ```yaml
/// version: 1
/// tick_seconds: 30
/// max_fanless_temp: 60.0
/// max_fan_temp: 80.0
/// min_fan_temp: 45.0
///
/// sensor:
///   kind: thermal-zone
///   path: /sys/class/thermal/thermal_zone0/temp
///
/// fan:
///   kind: sj201-i2c
///   bus: 1
///   address: 4
///   register: 101
///   safety_gpio: 13
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    /// Control loop period in seconds.
    #[serde(default = "defaults::tick_seconds")]
    pub tick_seconds: u16,

    /// Highest temperature at which the fan stays off.
    #[serde(default = "defaults::max_fanless_temp")]
    pub max_fanless_temp: f32,

    /// Thermal throttle temperature; above it the fan runs at full speed.
    #[serde(default = "defaults::max_fan_temp")]
    pub max_fan_temp: f32,

    /// Optional override of the fan start temperature, applied through the
    /// same checks as a runtime update.
    #[serde(default)]
    pub min_fan_temp: Option<f32>,

    /// Temperature source.
    #[serde(default)]
    pub sensor: SensorCfg,

    /// Fan hardware.
    #[serde(default)]
    pub fan: FanCfg,
}

/// Temperature source configuration variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SensorCfg {
    /// Linux thermal zone reporting millidegrees Celsius.
    ThermalZone {
        #[serde(default = "defaults::thermal_zone")]
        path: PathBuf,
    },
}

/// Fan hardware configuration variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FanCfg {
    /// SJ201 rev6 fan controller reached with `i2cset`.
    #[serde(rename = "sj201-i2c")]
    Sj201I2c {
        /// I2C bus number.
        #[serde(default = "defaults::i2c_bus")]
        bus: u8,

        /// 7-bit device address.
        #[serde(default = "defaults::i2c_address")]
        address: u8,

        /// Register receiving the duty cycle.
        #[serde(default = "defaults::i2c_register")]
        register: u8,

        /// Sysfs GPIO number of the fan enable line, forced low on shutdown.
        ///
        /// Unset by default because the number depends on the board wiring;
        /// without it the shutdown fail-safe is skipped with a warning.
        #[serde(default)]
        safety_gpio: Option<u32>,
    },
}

impl Default for SensorCfg {
    fn default() -> Self {
        SensorCfg::ThermalZone {
            path: defaults::thermal_zone(),
        }
    }
}

impl Default for FanCfg {
    fn default() -> Self {
        FanCfg::Sj201I2c {
            bus: defaults::i2c_bus(),
            address: defaults::i2c_address(),
            register: defaults::i2c_register(),
            safety_gpio: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            tick_seconds: defaults::tick_seconds(),
            max_fanless_temp: defaults::max_fanless_temp(),
            max_fan_temp: defaults::max_fan_temp(),
            min_fan_temp: None,
            sensor: SensorCfg::default(),
            fan: FanCfg::default(),
        }
    }
}

impl Config {
    /// Validates the configuration for consistency.
    ///
    /// `min_fan_temp` is not checked here; it is applied later through
    /// [`ThermalSettings::set_min_fan_temp`](crate::fan_curve::ThermalSettings::set_min_fan_temp),
    /// which rejects bad values without failing startup.
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            anyhow::bail!("Unsupported config version {}", self.version);
        }
        if self.tick_seconds == 0 {
            anyhow::bail!("tick_seconds must be greater than zero");
        }

        let range = MIN_THRESHOLD_TEMP..=MAX_THRESHOLD_TEMP;
        for (name, value) in [
            ("max_fanless_temp", self.max_fanless_temp),
            ("max_fan_temp", self.max_fan_temp),
        ] {
            if !range.contains(&value) {
                anyhow::bail!(
                    "{name} {value}C is outside {MIN_THRESHOLD_TEMP}C..={MAX_THRESHOLD_TEMP}C"
                );
            }
        }

        if self.max_fanless_temp >= self.max_fan_temp {
            anyhow::bail!(
                "max_fanless_temp ({}C) must be below max_fan_temp ({}C)",
                self.max_fanless_temp,
                self.max_fan_temp
            );
        }

        Ok(())
    }

    /// Temperature at which the fan starts: the override if set, the fanless threshold otherwise.
    pub fn fan_start_temp(&self) -> f32 {
        self.min_fan_temp.unwrap_or(self.max_fanless_temp)
    }

    /// Names of the sections that differ from `other` and need a restart to apply.
    ///
    /// `max_fanless_temp` and `min_fan_temp` are not listed; both feed
    /// [`fan_start_temp`](Self::fan_start_temp), which is applied live.
    pub fn cold_sections(&self, other: &Config) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.tick_seconds != other.tick_seconds {
            changed.push("tick_seconds");
        }
        if self.max_fan_temp != other.max_fan_temp {
            changed.push("max_fan_temp");
        }
        if self.sensor != other.sensor {
            changed.push("sensor");
        }
        if self.fan != other.fan {
            changed.push("fan");
        }
        changed
    }
}

/// Difference between the previous and the freshly loaded configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    /// New fan start temperature, if it differs from the previous one.
    ///
    /// Removing `min_fan_temp` from the file yields the new `max_fanless_temp`
    /// here, matching what a fresh start would use.
    pub fan_start_temp: Option<f32>,

    /// Sections whose change only takes effect after a restart.
    pub cold_sections: Vec<&'static str>,
}

impl ConfigChange {
    fn between(old: &Config, new: &Config) -> Self {
        let start = new.fan_start_temp();
        let fan_start_temp = (start != old.fan_start_temp()).then_some(start);
        Self {
            fan_start_temp,
            cold_sections: old.cold_sections(new),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fan_start_temp.is_none() && self.cold_sections.is_empty()
    }
}

mod defaults {
    use std::path::PathBuf;

    /// Default control period in seconds.
    pub fn tick_seconds() -> u16 {
        30
    }

    pub fn max_fanless_temp() -> f32 {
        super::DEFAULT_MAX_FANLESS_TEMP
    }

    pub fn max_fan_temp() -> f32 {
        super::DEFAULT_MAX_FAN_TEMP
    }

    pub fn thermal_zone() -> PathBuf {
        PathBuf::from(super::DEFAULT_THERMAL_ZONE)
    }

    pub fn i2c_bus() -> u8 {
        super::DEFAULT_BUS
    }

    pub fn i2c_address() -> u8 {
        super::DEFAULT_ADDRESS
    }

    pub fn i2c_register() -> u8 {
        super::FAN_SPEED_REGISTER
    }
}

fn locate_config() -> Option<PathBuf> {
    // 1) ENV
    if let Ok(env_path) = env::var("MK2_FAND_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    // 2) XDG_CONFIG_HOME or $HOME/.config
    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("mk2_fand/config.yml");
        if cfg_dir.exists() {
            return Some(cfg_dir);
        }
    }

    // 3) /etc
    let etc = Path::new("/etc/mk2_fand/config.yml");
    if etc.exists() {
        return Some(etc.to_path_buf());
    }

    None
}

/// Configuration manager that handles both config data and file operations.
///
/// # Example
///
/// ```no_run
/// use mk2_fand::config::ConfigManager;
/// use std::path::PathBuf;
///
/// # async fn example() -> anyhow::Result<()> {
/// // Load from specific path
/// let config_manager = ConfigManager::load(Some(PathBuf::from("config.yml"))).await?;
///
/// // Load from standard locations, falling back to defaults
/// let config_manager = ConfigManager::load(None).await?;
///
/// let tick_seconds = config_manager.get().await.tick_seconds;
///
/// let change = config_manager.reload().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    path: PathBuf,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the given config and path.
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Loads configuration from file or standard locations.
    ///
    /// Searches for configuration in the following order:
    /// 1. Provided path parameter
    /// 2. MK2_FAND_CONFIG environment variable
    /// 3. XDG_CONFIG_HOME/mk2_fand/config.yml or ~/.config/mk2_fand/config.yml
    /// 4. /etc/mk2_fand/config.yml
    ///
    /// Without an explicit path and with no file found, built-in defaults are used.
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path.or_else(locate_config) {
            Some(p) => p,
            None => {
                let fallback = PathBuf::from("/etc/mk2_fand/config.yml");
                info!(
                    "No configuration file found, using defaults (expected at {})",
                    fallback.display()
                );
                return Ok(Self::new(Config::default(), fallback));
            }
        };

        info!("Loading config from: {}", config_path.display());
        let config = Self::load_config_from_path(&config_path)?;

        Ok(Self::new(config, config_path))
    }

    /// Gets a read-only reference to the current configuration.
    pub async fn get(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config.read().await
    }

    /// Returns the path to the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clones the current configuration.
    pub async fn clone_config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Reloads configuration from the same file and reports what changed.
    ///
    /// The in-memory configuration is left untouched if the file does not
    /// parse or validate.
    pub async fn reload(&self) -> Result<ConfigChange> {
        info!("Reloading config from: {}", self.path.display());
        let new_config = Self::load_config_from_path(&self.path)?;

        let mut current = self.config.write().await;
        let change = ConfigChange::between(&current, &new_config);
        *current = new_config;

        info!("Configuration reloaded successfully");
        Ok(change)
    }

    /// Loads configuration from a specific path (internal helper).
    fn load_config_from_path(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // Helper function to create temporary config file
    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[tokio::test]
    async fn config_load_valid_yaml() {
        let yaml_content = r#"
version: 1
tick_seconds: 10
max_fanless_temp: 55.0
max_fan_temp: 75.0
min_fan_temp: 45.0
sensor:
  kind: thermal-zone
  path: /sys/class/thermal/thermal_zone1/temp
fan:
  kind: sj201-i2c
  bus: 2
  address: 0x05
  register: 100
  safety_gpio: 13
"#;

        let temp_file = create_temp_config(yaml_content);
        let config_manager = ConfigManager::load(Some(temp_file.path().to_path_buf()))
            .await
            .unwrap();
        let config = config_manager.clone_config().await;

        assert_eq!(config.tick_seconds, 10);
        assert_eq!(config.max_fanless_temp, 55.0);
        assert_eq!(config.max_fan_temp, 75.0);
        assert_eq!(config.min_fan_temp, Some(45.0));
        assert_eq!(
            config.sensor,
            SensorCfg::ThermalZone {
                path: PathBuf::from("/sys/class/thermal/thermal_zone1/temp")
            }
        );
        assert_eq!(
            config.fan,
            FanCfg::Sj201I2c {
                bus: 2,
                address: 5,
                register: 100,
                safety_gpio: Some(13)
            }
        );
        assert_eq!(config_manager.path(), temp_file.path());
    }

    #[tokio::test]
    async fn config_minimal_yaml_uses_defaults() {
        let temp_file = create_temp_config("version: 1\n");
        let config = ConfigManager::load(Some(temp_file.path().to_path_buf()))
            .await
            .unwrap()
            .clone_config()
            .await;

        assert_eq!(config, Config::default());
        assert_eq!(config.tick_seconds, 30);
        assert_eq!(config.max_fanless_temp, 60.0);
        assert_eq!(config.max_fan_temp, 80.0);
        assert_eq!(config.min_fan_temp, None);
    }

    #[tokio::test]
    async fn config_partial_fan_section_fills_defaults() {
        let temp_file = create_temp_config("version: 1\nfan:\n  kind: sj201-i2c\n  safety_gpio: 4\n");
        let config = ConfigManager::load(Some(temp_file.path().to_path_buf()))
            .await
            .unwrap()
            .clone_config()
            .await;

        assert_eq!(
            config.fan,
            FanCfg::Sj201I2c {
                bus: 1,
                address: 4,
                register: 101,
                safety_gpio: Some(4)
            }
        );
    }

    #[tokio::test]
    async fn config_load_rejects_invalid_thresholds() {
        let temp_file = create_temp_config("version: 1\nmax_fanless_temp: 85.0\n");
        let result = ConfigManager::load(Some(temp_file.path().to_path_buf())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn config_load_rejects_bad_yaml() {
        let temp_file = create_temp_config("version: [1\n");
        let err = ConfigManager::load(Some(temp_file.path().to_path_buf()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to parse YAML"));
    }

    #[test]
    fn config_validate_default() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn config_validate_errors() {
        let cases = [
            Config {
                version: 2,
                ..Default::default()
            },
            Config {
                tick_seconds: 0,
                ..Default::default()
            },
            Config {
                max_fan_temp: 90.0,
                ..Default::default()
            },
            Config {
                max_fanless_temp: -1.0,
                ..Default::default()
            },
            Config {
                max_fanless_temp: 70.0,
                max_fan_temp: 70.0,
                ..Default::default()
            },
        ];

        for config in cases {
            assert!(config.validate().is_err(), "expected rejection: {config:?}");
        }
    }

    #[test]
    fn config_validate_ignores_min_fan_temp() {
        let config = Config {
            min_fan_temp: Some(95.0),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cold_sections_lists_restart_only_changes() {
        let old = Config::default();
        let new = Config {
            tick_seconds: 5,
            min_fan_temp: Some(40.0),
            fan: FanCfg::Sj201I2c {
                bus: 1,
                address: 4,
                register: 101,
                safety_gpio: Some(13),
            },
            ..Default::default()
        };

        assert_eq!(old.cold_sections(&new), vec!["tick_seconds", "fan"]);
        assert!(old.cold_sections(&old).is_empty());
    }

    #[test]
    fn fanless_threshold_edit_is_hot() {
        let old = Config::default();
        let new = Config {
            max_fanless_temp: 50.0,
            ..Default::default()
        };

        assert!(old.cold_sections(&new).is_empty());
        assert_eq!(ConfigChange::between(&old, &new).fan_start_temp, Some(50.0));
    }

    #[test]
    fn override_edit_shadowed_by_same_start_temp_is_empty() {
        let old = Config {
            min_fan_temp: Some(60.0),
            ..Default::default()
        };
        assert!(ConfigChange::between(&old, &Config::default()).is_empty());
    }

    #[tokio::test]
    async fn reload_after_removing_override_falls_back_to_fanless_temp() {
        let temp_file = create_temp_config("version: 1\nmin_fan_temp: 45.0\n");
        let manager = ConfigManager::load(Some(temp_file.path().to_path_buf()))
            .await
            .unwrap();

        fs::write(temp_file.path(), "version: 1\n").unwrap();
        let change = manager.reload().await.unwrap();

        assert!(!change.is_empty());
        assert_eq!(change.fan_start_temp, Some(60.0));
    }

    #[tokio::test]
    async fn reload_reports_hot_change() {
        let temp_file = create_temp_config("version: 1\nmin_fan_temp: 50.0\n");
        let manager = ConfigManager::load(Some(temp_file.path().to_path_buf()))
            .await
            .unwrap();

        fs::write(temp_file.path(), "version: 1\nmin_fan_temp: 42.5\n").unwrap();
        let change = manager.reload().await.unwrap();

        assert_eq!(change.fan_start_temp, Some(42.5));
        assert!(change.cold_sections.is_empty());
        assert_eq!(manager.get().await.min_fan_temp, Some(42.5));
    }

    #[tokio::test]
    async fn reload_unchanged_file_is_empty_change() {
        let temp_file = create_temp_config("version: 1\nmin_fan_temp: 50.0\n");
        let manager = ConfigManager::load(Some(temp_file.path().to_path_buf()))
            .await
            .unwrap();

        let change = manager.reload().await.unwrap();
        assert!(change.is_empty());
    }

    #[tokio::test]
    async fn reload_keeps_config_on_invalid_file() {
        let temp_file = create_temp_config("version: 1\ntick_seconds: 7\n");
        let manager = ConfigManager::load(Some(temp_file.path().to_path_buf()))
            .await
            .unwrap();

        fs::write(temp_file.path(), "version: 1\nmax_fan_temp: 120.0\n").unwrap();
        assert!(manager.reload().await.is_err());
        assert_eq!(manager.get().await.tick_seconds, 7);
    }

    #[tokio::test]
    #[serial]
    async fn load_uses_env_path() {
        let temp_file = create_temp_config("version: 1\ntick_seconds: 12\n");
        // SAFETY: env access is serialized by `#[serial]`.
        unsafe { env::set_var("MK2_FAND_CONFIG", temp_file.path()) };

        let manager = ConfigManager::load(None).await;

        unsafe { env::remove_var("MK2_FAND_CONFIG") };
        let manager = manager.unwrap();
        assert_eq!(manager.get().await.tick_seconds, 12);
        assert_eq!(manager.path(), temp_file.path());
    }

    #[tokio::test]
    #[serial]
    async fn load_falls_back_to_defaults() {
        let empty_home = tempfile::tempdir().unwrap();
        // SAFETY: env access is serialized by `#[serial]`.
        unsafe {
            env::remove_var("MK2_FAND_CONFIG");
            env::set_var("XDG_CONFIG_HOME", empty_home.path());
        }

        let manager = ConfigManager::load(None).await;

        unsafe { env::remove_var("XDG_CONFIG_HOME") };
        if Path::new("/etc/mk2_fand/config.yml").exists() {
            return;
        }
        assert_eq!(manager.unwrap().clone_config().await, Config::default());
    }
}
