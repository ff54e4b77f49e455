//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use zb_watch::DEFAULT_PHONE_PATTERNS;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the event log and user settings.
    pub data_dir: PathBuf,
    /// Event log path; defaults to `zenbox.db` in the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    /// User settings path; defaults to `user_config.json` in the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_path: Option<PathBuf>,
    /// Address the HTTP API listens on.
    pub bind: String,
    #[serde(default)]
    pub watcher: WatcherSettings,
}

/// Device watcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
    /// Seconds between polls.
    pub interval_secs: u64,
    /// Seconds before a hung `lsusb` is killed.
    pub command_timeout_secs: u64,
    /// Start polling when the server starts.
    pub autostart: bool,
    /// Case-insensitive name fragments that identify phones.
    pub phone_patterns: Vec<String>,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            command_timeout_secs: 5,
            autostart: true,
            phone_patterns: DEFAULT_PHONE_PATTERNS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl WatcherSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("database_path", &self.database_path())
            .field("settings_path", &self.settings_path())
            .field("bind", &self.bind)
            .field("watcher.interval_secs", &self.watcher.interval_secs)
            .field("watcher.autostart", &self.watcher.autostart)
            .field("watcher.phone_patterns", &self.watcher.phone_patterns.len())
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: dirs_data_path().unwrap_or_else(|| PathBuf::from(".")),
            database_path: None,
            settings_path: None,
            bind: "0.0.0.0:8182".to_string(),
            watcher: WatcherSettings::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (ZENBOX_*, nested with `__`)
        figment = figment.merge(Env::prefixed("ZENBOX_").split("__"));

        figment.extract()
    }

    /// Path of the `SQLite` event log.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("zenbox.db"))
    }

    /// Path of the user settings document.
    pub fn settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("user_config.json"))
    }
}

/// Returns the platform-specific config directory for zenbox.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("zenbox"))
}

/// Returns the platform-specific data directory for zenbox.
///
/// On Linux: `~/.local/share/zenbox`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("zenbox"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_data_path_ends_with_zenbox() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "zenbox");
    }

    #[test]
    fn test_default_paths_follow_data_dir() {
        let config = Config {
            data_dir: PathBuf::from("/var/lib/zenbox"),
            ..Config::default()
        };
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/zenbox/zenbox.db")
        );
        assert_eq!(
            config.settings_path(),
            PathBuf::from("/var/lib/zenbox/user_config.json")
        );
    }

    #[test]
    fn test_default_watcher_settings() {
        let config = Config::default();
        assert_eq!(config.bind, "0.0.0.0:8182");
        assert_eq!(config.watcher.interval(), Duration::from_secs(2));
        assert_eq!(config.watcher.command_timeout(), Duration::from_secs(5));
        assert!(config.watcher.autostart);
        assert!(config.watcher.phone_patterns.iter().any(|p| p == "pixel"));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "/tmp/zenbox-test"
settings_path = "/tmp/elsewhere/settings.json"

[watcher]
interval_secs = 10
phone_patterns = ["fairphone"]
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();

        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/zenbox-test/zenbox.db")
        );
        assert_eq!(
            config.settings_path(),
            PathBuf::from("/tmp/elsewhere/settings.json")
        );
        assert_eq!(config.watcher.interval_secs, 10);
        assert_eq!(config.watcher.command_timeout_secs, 5);
        assert_eq!(config.watcher.phone_patterns, ["fairphone"]);
    }

    #[test]
    fn test_zero_interval_is_raised_to_one_second() {
        let settings = WatcherSettings {
            interval_secs: 0,
            ..WatcherSettings::default()
        };
        assert_eq!(settings.interval(), Duration::from_secs(1));
    }
}
