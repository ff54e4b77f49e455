//! Raw connect/disconnect events from the device log.
//!
//! # Timestamp Format
//!
//! Timestamps are local wall-clock times. Current writers use second precision
//! (`2025-01-15 09:30:15`). Logs written by earlier versions use minute
//! precision (`2025-01-15 09:30`), so both are accepted on read. Anything else
//! is treated as a malformed row and skipped by consumers.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Second-precision timestamp format used for new events.
pub const SECOND_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Minute-precision timestamp format from legacy logs.
pub const MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// An event suitable for session reconstruction.
///
/// This trait allows reconstruction to work with different event representations
/// (e.g., `EventRecord` from zb-db, or test fixtures).
pub trait ConnectionEvent {
    /// Returns the timestamp exactly as it was logged.
    fn raw_timestamp(&self) -> &str;

    /// Returns `true` for a connect event, `false` for a disconnect.
    fn is_connected(&self) -> bool;

    /// Returns the device display name (may be empty).
    fn device_name(&self) -> &str;

    /// Parses the logged timestamp, returning `None` for malformed rows.
    fn timestamp(&self) -> Option<NaiveDateTime> {
        parse_timestamp(self.raw_timestamp())
    }
}

/// A device connection change as written to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEvent {
    /// When the change was observed.
    pub timestamp: String,
    /// Whether the device was connected (`true`) or disconnected (`false`).
    pub connected: bool,
    /// Display name of the device, empty when unknown.
    #[serde(default)]
    pub device_name: String,
}

impl DeviceEvent {
    /// Creates an event stamped with the given local time.
    pub fn new(timestamp: NaiveDateTime, connected: bool, device_name: impl Into<String>) -> Self {
        Self {
            timestamp: format_timestamp(timestamp),
            connected,
            device_name: device_name.into(),
        }
    }
}

impl ConnectionEvent for DeviceEvent {
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

/// Parses a logged timestamp in second or minute precision.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, SECOND_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, MINUTE_FORMAT))
        .ok()
}

/// Formats a timestamp for the log (second precision).
pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(SECOND_FORMAT).to_string()
}

/// Parses the string-typed connected flag from legacy logs.
///
/// Accepts `true`/`false` in any case; anything else is `None`.
pub fn parse_connected_flag(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Whether a device is connected right now, judged by the most recent raw event.
///
/// An unmatched trailing connect always means "currently connected", so only
/// the tail of the log is inspected. Rows with malformed timestamps are
/// skipped here just as reconstruction skips them.
pub fn is_zen_mode<E: ConnectionEvent>(events: &[E]) -> bool {
    events
        .iter()
        .rev()
        .find(|event| event.timestamp().is_some())
        .is_some_and(ConnectionEvent::is_connected)
}
