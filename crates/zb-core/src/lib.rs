//! Core domain logic for Zenbox.
//!
//! This crate contains the fundamental types and logic for:
//! - Events: the raw connect/disconnect log and its timestamp encodings
//! - Session reconstruction: turning the log into connected intervals
//! - Aggregation: today, weekly, all-time and points statistics

pub mod event;
pub mod session;
pub mod stats;
pub mod types;

pub use event::{
    ConnectionEvent, DeviceEvent, format_timestamp, is_zen_mode, parse_connected_flag,
    parse_timestamp,
};
pub use session::{Session, reconstruct_sessions};
pub use stats::{DaySummary, StatsSnapshot, WEEK_DAYS, aggregate, compute_stats};
pub use types::{DailyTarget, ValidationError};
