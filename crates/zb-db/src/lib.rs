//! Storage layer for Zenbox.
//!
//! Provides the append-only device event log (`SQLite` via `rusqlite`) and the
//! JSON user settings document ([`SettingsStore`]).
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Appends must be serialized, so writers share a single `Database` behind a
//! `Mutex`. Readers open their own connection: the log runs in WAL mode, so a
//! reader always sees a consistent snapshot of committed rows and never a
//! partially written record.
//!
//! # Schema
//!
//! Events are never updated or deleted. `seq` records append order, which is
//! the order reconstruction consumes. `timestamp` is stored as the raw logged
//! text (see [`zb_core::event`]) so rows from older formats survive intact and
//! are filtered at read time instead of on write.

mod settings;

use std::path::Path;
use std::time::Duration;

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use thiserror::Error;
use zb_core::{ConnectionEvent, format_timestamp};

pub use settings::{ConfigPatch, SettingsError, SettingsStore, UserConfig, default_settings};

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A device event as stored in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Append sequence number.
    pub seq: i64,
    pub timestamp: String,
    pub connected: bool,
    pub device_name: String,
}

impl ConnectionEvent for EventRecord {
    fn raw_timestamp(&self) -> &str {
        &self.timestamp
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        // In-memory databases report "memory"; either answer is fine.
        let mode: String =
            self.conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::trace!(journal_mode = %mode, "database opened");

        self.conn.execute_batch(
            "
            -- Device events: append-only connect/disconnect log
            -- timestamp: local wall-clock text, 'YYYY-MM-DD HH:MM[:SS]'
            -- connected: 1 for connect, 0 for disconnect
            CREATE TABLE IF NOT EXISTS device_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                connected INTEGER NOT NULL,
                device_name TEXT NOT NULL DEFAULT ''
            );
            ",
        )?;
        Ok(())
    }

    /// Appends a single event stamped with `timestamp`.
    pub fn append_event(
        &mut self,
        timestamp: NaiveDateTime,
        connected: bool,
        device_name: &str,
    ) -> Result<EventRecord, DbError> {
        let timestamp = format_timestamp(timestamp);
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO device_events (timestamp, connected, device_name) VALUES (?, ?, ?)",
            params![timestamp, connected, device_name],
        )?;
        let seq = tx.last_insert_rowid();
        tx.commit()?;

        Ok(EventRecord {
            seq,
            timestamp,
            connected,
            device_name: device_name.to_string(),
        })
    }

    /// Appends a batch of events in one transaction, preserving their order.
    ///
    /// Timestamps are stored verbatim, so rows from older logs keep their
    /// original text.
    pub fn append_events<E: ConnectionEvent>(&mut self, events: &[E]) -> Result<usize, DbError> {
        if events.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO device_events (timestamp, connected, device_name) VALUES (?, ?, ?)",
            )?;
            for event in events {
                inserted += stmt.execute(params![
                    event.raw_timestamp(),
                    event.is_connected(),
                    event.device_name(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Lists all events in append order.
    pub fn list_events(&self) -> Result<Vec<EventRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT seq, timestamp, connected, device_name
            FROM device_events
            ORDER BY seq ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EventRecord {
                seq: row.get(0)?,
                timestamp: row.get(1)?,
                connected: row.get(2)?,
                device_name: row.get(3)?,
            })
        })?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Returns the most recently appended event, if any.
    pub fn last_event(&self) -> Result<Option<EventRecord>, DbError> {
        let event = self
            .conn
            .query_row(
                "
                SELECT seq, timestamp, connected, device_name
                FROM device_events
                ORDER BY seq DESC
                LIMIT 1
                ",
                [],
                |row| {
                    Ok(EventRecord {
                        seq: row.get(0)?,
                        timestamp: row.get(1)?,
                        connected: row.get(2)?,
                        device_name: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(event)
    }

    /// Returns the number of events in the log.
    pub fn event_count(&self) -> Result<u64, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM device_events", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
