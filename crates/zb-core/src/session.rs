//! Session reconstruction from the raw connect/disconnect log.
//!
//! # Algorithm Summary
//!
//! A single left-to-right scan over the log, carrying only the start of the
//! currently open session:
//!
//! 1. A connect while no session is open starts one. A connect while a session
//!    is already open is a duplicate and is ignored (first connect wins).
//! 2. A disconnect while a session is open closes it. A disconnect with no open
//!    session is a no-op.
//! 3. Rows whose timestamp cannot be parsed are skipped entirely.
//! 4. A session still open after the scan is emitted as active, ending at `now`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::event::ConnectionEvent;

/// A maximal interval during which a device was continuously connected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// When the device connected.
    pub start: NaiveDateTime,
    /// When the device disconnected, or the read time for an active session.
    pub end: NaiveDateTime,
    /// Connected time in seconds (millisecond resolution, never negative).
    pub duration_seconds: f64,
    /// `true` when no disconnect has been observed yet.
    pub active: bool,
}

impl Session {
    /// Creates a session closed by a disconnect event.
    pub fn closed(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end,
            duration_seconds: seconds_between(start, end),
            active: false,
        }
    }

    /// Creates a session that is still open as of `now`.
    pub fn open(start: NaiveDateTime, now: NaiveDateTime) -> Self {
        Self {
            start,
            end: now,
            duration_seconds: seconds_between(start, now),
            active: true,
        }
    }
}

/// Seconds from `start` to `end`, clamped at zero for skewed clocks.
#[allow(clippy::cast_precision_loss)]
fn seconds_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    let millis = (end - start).num_milliseconds().max(0);
    millis as f64 / 1000.0
}

/// Reconstructs sessions from events in log order.
///
/// `now` closes a trailing open session; it is taken as an argument so the
/// active duration is computed fresh on each call rather than cached.
pub fn reconstruct_sessions<E: ConnectionEvent>(events: &[E], now: NaiveDateTime) -> Vec<Session> {
    let mut sessions = Vec::new();
    let mut open_since: Option<NaiveDateTime> = None;

    for event in events {
        let Some(timestamp) = event.timestamp() else {
            tracing::trace!(
                timestamp = event.raw_timestamp(),
                "skipping event with malformed timestamp"
            );
            continue;
        };

        match (event.is_connected(), open_since) {
            (true, None) => open_since = Some(timestamp),
            (false, Some(start)) => {
                sessions.push(Session::closed(start, timestamp));
                open_since = None;
            }
            // Duplicate connect or unmatched disconnect.
            (true, Some(_)) | (false, None) => {}
        }
    }

    if let Some(start) = open_since {
        sessions.push(Session::open(start, now));
    }

    sessions
}
