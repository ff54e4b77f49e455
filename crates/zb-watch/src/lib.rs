//! Phone connection watcher.
//!
//! Polls the attached USB devices on a fixed interval, picks out the ones that
//! look like phones, and appends a connect or disconnect event to the log for
//! every change since the previous poll.
//!
//! Enumeration and event storage sit behind the [`DeviceEnumerator`] and
//! [`EventSink`] traits so the diffing logic can run against scripted devices
//! in tests.

pub mod usb;
mod watcher;

use std::io;
use std::time::Duration;

use thiserror::Error;
use zb_db::DbError;

pub use usb::{DEFAULT_PHONE_PATTERNS, DeviceEnumerator, LsusbEnumerator, PhoneMatcher, UsbDevice};
pub use watcher::{
    DatabaseSink, EventSink, KnownDevice, PollOutcome, ScannedDevice, Scanner, Watcher,
    WatcherConfig, WatcherStatus, scan_devices,
};

/// Watcher errors.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The enumeration program is not installed.
    #[error("device enumeration command `{program}` not found")]
    CommandMissing { program: String },

    /// The enumeration program did not finish in time and was killed.
    #[error("device enumeration command `{program}` timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    /// The enumeration program exited unsuccessfully.
    #[error("device enumeration command `{program}` failed ({status}): {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// The enumeration program could not be spawned.
    #[error("failed to run `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    /// A phone name pattern did not compile.
    #[error("invalid phone pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The event could not be stored.
    #[error("failed to record device event: {0}")]
    Db(#[from] DbError),

    /// The blocking append task panicked or was cancelled.
    #[error("event append task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
