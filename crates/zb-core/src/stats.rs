//! Usage statistics aggregated from reconstructed sessions.
//!
//! All statistics are derived on demand from the full session list; nothing
//! here is persisted. Day bucketing uses each session's *start* date, so a
//! session spanning midnight counts entirely toward the day it began.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::event::{ConnectionEvent, is_zen_mode};
use crate::session::{Session, reconstruct_sessions};
use crate::types::DailyTarget;

/// Number of days reported in `weekly_data`.
pub const WEEK_DAYS: usize = 7;

/// Connected time for a single calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    /// Abbreviated weekday name (e.g., "Mon").
    pub day_label: String,
    /// The calendar date this entry covers.
    pub date: NaiveDate,
    /// Whole minutes of sessions that started on this date.
    pub zen_minutes: u64,
    /// The daily target in minutes.
    pub target: u32,
}

/// Point-in-time usage statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Connected time across all sessions, in seconds.
    pub total_time_seconds: f64,
    /// All sessions, oldest first.
    pub sessions: Vec<Session>,
    /// Whether a device is connected right now.
    pub is_zen_mode: bool,
    /// Whole minutes of sessions that started today.
    pub today_zen_minutes: u64,
    /// One point per whole second of connected time, all time.
    pub zen_points: u64,
    /// One point per whole second of sessions that started today.
    pub today_points: u64,
    /// The last seven days, oldest first, ending today.
    pub weekly_data: Vec<DaySummary>,
    /// The daily target in minutes.
    pub daily_target: u32,
    /// Set only on best-effort responses after a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatsSnapshot {
    /// A snapshot with every counter at zero, used when statistics cannot be computed.
    pub fn zeroed(target: DailyTarget, now: NaiveDateTime) -> Self {
        aggregate(Vec::new(), target, now)
    }

    /// Attaches an error description to the snapshot.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Whole units of a non-negative float.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole(value: f64) -> u64 {
    value.max(0.0).floor() as u64
}

/// Aggregates sessions into statistics as of `now`.
///
/// `now` fixes "today" (its calendar date) and therefore the weekly window.
/// `is_zen_mode` is derived from whether the last session is active; callers
/// holding the raw log should prefer [`compute_stats`], which reads the log tail.
pub fn aggregate(sessions: Vec<Session>, target: DailyTarget, now: NaiveDateTime) -> StatsSnapshot {
    let today = now.date();

    let mut seconds_by_day: HashMap<NaiveDate, f64> = HashMap::new();
    let mut total_time_seconds = 0.0;
    for session in &sessions {
        total_time_seconds += session.duration_seconds;
        *seconds_by_day.entry(session.start.date()).or_insert(0.0) += session.duration_seconds;
    }

    let today_seconds = seconds_by_day.get(&today).copied().unwrap_or(0.0);

    let weekly_data = (0..WEEK_DAYS)
        .rev()
        .map(|offset| {
            let offset = i64::try_from(offset).unwrap_or_default();
            let date = today - Duration::days(offset);
            let seconds = seconds_by_day.get(&date).copied().unwrap_or(0.0);
            DaySummary {
                day_label: date.format("%a").to_string(),
                date,
                zen_minutes: whole(seconds / 60.0),
                target: target.minutes(),
            }
        })
        .collect();

    let is_zen_mode = sessions.last().is_some_and(|s| s.active);

    StatsSnapshot {
        total_time_seconds,
        is_zen_mode,
        today_zen_minutes: whole(today_seconds / 60.0),
        zen_points: whole(total_time_seconds),
        today_points: whole(today_seconds),
        weekly_data,
        daily_target: target.minutes(),
        sessions,
        error: None,
    }
}

/// Reconstructs sessions from the raw log and aggregates them.
///
/// `is_zen_mode` comes from the most recent raw event with a valid timestamp,
/// independent of reconstruction.
pub fn compute_stats<E: ConnectionEvent>(
    events: &[E],
    target: DailyTarget,
    now: NaiveDateTime,
) -> StatsSnapshot {
    let sessions = reconstruct_sessions(events, now);
    let mut snapshot = aggregate(sessions, target, now);
    snapshot.is_zen_mode = is_zen_mode(events);
    snapshot
}
