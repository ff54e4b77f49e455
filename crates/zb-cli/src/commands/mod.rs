//! CLI subcommand implementations.

pub mod events;
pub mod import;
pub mod record;
pub mod scan;
pub mod stats;
pub mod user_config;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use zb_db::{Database, SettingsStore};

use crate::Config;

/// Opens the event log, creating its directory if needed.
pub fn open_database(config: &Config) -> Result<Database> {
    let path = config.database_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Database::open(&path).with_context(|| format!("failed to open {}", path.display()))
}

/// Returns the settings store for the configured path.
pub fn settings_store(config: &Config) -> SettingsStore {
    SettingsStore::new(config.settings_path())
}

/// Local wall-clock time, the clock all events are stamped with.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}
