//! User settings persisted as a small JSON document.
//!
//! The document holds the daily target and a free-form settings map used by
//! the web front end. Older releases stored a weekly target instead; it is
//! migrated to a daily one (weekly / 7) the first time the document is loaded
//! and the legacy field is dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use zb_core::{DailyTarget, ValidationError};

/// Settings store errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Reading or writing the settings file failed.
    #[error("failed to write settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The settings could not be encoded as JSON.
    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
    /// A value was rejected by validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// The user's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    /// Daily goal in minutes.
    pub daily_target: DailyTarget,
    /// Front-end preferences (reminders, zen hours, ...).
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            daily_target: DailyTarget::default(),
            settings: default_settings(),
        }
    }
}

/// The settings map a fresh install starts with.
pub fn default_settings() -> Map<String, Value> {
    let mut settings = Map::new();
    settings.insert("autoReminder".to_string(), json!(true));
    settings.insert("callFiltering".to_string(), json!(true));
    settings.insert("zenHours".to_string(), json!("20:00-22:00"));
    settings.insert(
        "zenDays".to_string(),
        json!(["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"]),
    );
    settings
}

/// A partial update to [`UserConfig`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    /// New daily target; validated before anything is written.
    #[serde(default)]
    pub daily_target: Option<i64>,
    /// Keys to merge into the settings map (shallow).
    #[serde(default)]
    pub settings: Option<Map<String, Value>>,
}

/// On-disk shape, tolerant of both current and legacy documents.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredConfig {
    #[serde(default)]
    daily_target: Option<i64>,
    #[serde(default)]
    weekly_target: Option<i64>,
    #[serde(default)]
    settings: Option<Map<String, Value>>,
}

/// What `load` had to do to produce a valid config.
#[derive(Debug, PartialEq, Eq)]
enum LoadOutcome {
    /// The document was current and valid.
    Current,
    /// The document needs rewriting (migrated, clamped, or reset).
    Rewrite,
}

/// JSON-file backed settings provider.
///
/// Writes are serialized through an internal lock and go through a temporary
/// file that is renamed over the document, so a crash never leaves it half
/// written.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SettingsStore {
    /// Creates a store for the document at `path`. Nothing is read until [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the document path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the config, repairing the document when needed.
    ///
    /// A missing or corrupt document is replaced with defaults and a legacy
    /// weekly target is migrated. Running this on an already current document
    /// does not write anything.
    pub fn load(&self) -> Result<UserConfig, SettingsError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.load_locked()
    }

    /// Returns the configured daily target.
    pub fn daily_target(&self) -> Result<DailyTarget, SettingsError> {
        Ok(self.load()?.daily_target)
    }

    /// Validates and stores a new daily target.
    ///
    /// On validation failure the document is left unchanged.
    pub fn set_daily_target(&self, minutes: i64) -> Result<UserConfig, SettingsError> {
        self.update(ConfigPatch {
            daily_target: Some(minutes),
            settings: None,
        })
    }

    /// Applies a partial update and returns the new config.
    ///
    /// The whole patch is validated before anything is written.
    pub fn update(&self, patch: ConfigPatch) -> Result<UserConfig, SettingsError> {
        let daily_target = patch.daily_target.map(DailyTarget::new).transpose()?;

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut config = self.load_locked()?;
        if let Some(target) = daily_target {
            config.daily_target = target;
        }
        if let Some(settings) = patch.settings {
            config.settings.extend(settings);
        }
        self.save(&config)?;
        tracing::debug!(daily_target = %config.daily_target, "settings updated");
        Ok(config)
    }

    fn load_locked(&self) -> Result<UserConfig, SettingsError> {
        let (config, outcome) = match fs::read_to_string(&self.path) {
            Ok(content) => parse_document(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "creating default settings");
                (UserConfig::default(), LoadOutcome::Rewrite)
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "settings unreadable, resetting to defaults"
                );
                (UserConfig::default(), LoadOutcome::Rewrite)
            }
        };

        if outcome == LoadOutcome::Rewrite {
            self.save(&config)?;
        }
        Ok(config)
    }

    fn save(&self, config: &UserConfig) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(config)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

/// Interprets a stored document, migrating legacy fields.
fn parse_document(content: &str) -> (UserConfig, LoadOutcome) {
    let stored: StoredConfig = match serde_json::from_str(content) {
        Ok(stored) => stored,
        Err(e) => {
            tracing::warn!(error = %e, "settings corrupt, resetting to defaults");
            return (UserConfig::default(), LoadOutcome::Rewrite);
        }
    };

    let mut outcome = LoadOutcome::Current;

    let daily_minutes = match (stored.daily_target, stored.weekly_target) {
        (Some(daily), weekly) => {
            if weekly.is_some() {
                outcome = LoadOutcome::Rewrite;
            }
            daily
        }
        (None, Some(weekly)) => {
            let daily = weekly.div_euclid(7);
            tracing::info!(weekly, daily, "migrating weekly target to daily target");
            outcome = LoadOutcome::Rewrite;
            daily
        }
        (None, None) => {
            outcome = LoadOutcome::Rewrite;
            i64::from(DailyTarget::DEFAULT.minutes())
        }
    };

    let daily_target = DailyTarget::new(daily_minutes).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "stored daily target out of range, clamping");
        outcome = LoadOutcome::Rewrite;
        DailyTarget::clamped(daily_minutes)
    });

    let settings = stored.settings.unwrap_or_else(|| {
        outcome = LoadOutcome::Rewrite;
        default_settings()
    });

    (
        UserConfig {
            daily_target,
            settings,
        },
        outcome,
    )
}
