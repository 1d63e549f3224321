// Configuration management for the keep-alive CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/keepalive/config.json
// - Linux: ~/.config/keepalive/config.json
// - Windows: %APPDATA%\keepalive\config.json

use anyhow::{Context, Result};
use keepalive_core::{KeepAliveConfig, LoggingConfig, PlatformCapabilities};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Lifecycle manager settings
    pub keepalive: KeepAliveConfig,

    /// Log level, format and optional file output
    pub logging: LoggingConfig,

    /// Simulated device the commands run against
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Android API level; 0 simulates a platform without runtime gates
    pub sdk_int: u32,

    /// Notification permission granted at session start
    pub notifications_enabled: bool,

    /// Battery optimization exemption at session start
    pub battery_exempt: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sdk_int: 34,
            notifications_enabled: false,
            battery_exempt: false,
        }
    }
}

impl SimulationConfig {
    pub fn capabilities(&self) -> PlatformCapabilities {
        if self.sdk_int == 0 {
            PlatformCapabilities::desktop()
        } else {
            PlatformCapabilities::android(self.sdk_int)
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("keepalive");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.keepalive
            .validate()
            .context("Invalid keep-alive settings")?;
        self.logging.validate().context("Invalid logging settings")?;
        Ok(())
    }

    /// Set a config value by key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "sdk_int" => {
                self.simulation.sdk_int = value.parse().context("Invalid API level")?;
            }
            "notifications_enabled" => {
                self.simulation.notifications_enabled =
                    value.parse().context("Invalid boolean value")?;
            }
            "battery_exempt" => {
                self.simulation.battery_exempt = value.parse().context("Invalid boolean value")?;
            }
            "wake_lock_tag" => self.keepalive.wake_lock_tag = value.to_string(),
            "auto_start_on_grant" => {
                self.keepalive.auto_start_on_grant =
                    value.parse().context("Invalid boolean value")?;
            }
            "queue_depth" => {
                self.keepalive.queue_depth = value.parse().context("Invalid number")?;
            }
            "log_level" => self.logging.level = value.to_string(),
            "log_json" => {
                self.logging.json = value.parse().context("Invalid boolean value")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        self.validate()
    }

    /// Get a config value by key
    pub fn get(&self, key: &str) -> Option<String> {
        self.list()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// List all settable values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            ("sdk_int".to_string(), self.simulation.sdk_int.to_string()),
            (
                "notifications_enabled".to_string(),
                self.simulation.notifications_enabled.to_string(),
            ),
            (
                "battery_exempt".to_string(),
                self.simulation.battery_exempt.to_string(),
            ),
            (
                "wake_lock_tag".to_string(),
                self.keepalive.wake_lock_tag.clone(),
            ),
            (
                "auto_start_on_grant".to_string(),
                self.keepalive.auto_start_on_grant.to_string(),
            ),
            (
                "queue_depth".to_string(),
                self.keepalive.queue_depth.to_string(),
            ),
            ("log_level".to_string(), self.logging.level.clone()),
            ("log_json".to_string(), self.logging.json.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.simulation.sdk_int, 34);
        assert!(!config.simulation.notifications_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.set("sdk_int", "29").unwrap();
        config.set("notifications_enabled", "true").unwrap();
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.simulation.sdk_int, 29);
        assert!(reloaded.simulation.notifications_enabled);
    }

    #[test]
    fn test_set_rejects_invalid_values() {
        let mut config = Config::default();
        assert!(config.set("queue_depth", "0").is_err());
        assert!(config.set("sdk_int", "abc").is_err());
        assert!(config.set("no_such_key", "1").is_err());
    }

    #[test]
    fn test_get_matches_list() {
        let config = Config::default();
        assert_eq!(
            config.get("wake_lock_tag").as_deref(),
            Some("RePhoneCamera:ForegroundService")
        );
        assert_eq!(config.get("missing"), None);
    }

    #[test]
    fn test_legacy_sdk_disables_runtime_gate() {
        let simulation = SimulationConfig {
            sdk_int: 29,
            ..Default::default()
        };
        assert!(!simulation.capabilities().runtime_notification_permission);
        assert!(simulation.capabilities().battery_optimizations);
    }
}
