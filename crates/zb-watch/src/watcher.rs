//! Polling loop and lifecycle.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zb_db::Database;

use crate::WatchError;
use crate::usb::{DeviceEnumerator, PhoneMatcher, UsbDevice};

/// Receives connect and disconnect transitions.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn append(
        &self,
        timestamp: NaiveDateTime,
        connected: bool,
        device_name: &str,
    ) -> Result<(), WatchError>;
}

/// Appends transitions to the shared event log writer.
///
/// The SQLite write runs on the blocking pool so a slow disk never stalls the
/// runtime's worker threads.
pub struct DatabaseSink {
    db: Arc<Mutex<Database>>,
}

impl DatabaseSink {
    pub const fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventSink for DatabaseSink {
    async fn append(
        &self,
        timestamp: NaiveDateTime,
        connected: bool,
        device_name: &str,
    ) -> Result<(), WatchError> {
        let db = Arc::clone(&self.db);
        let device_name = device_name.to_string();
        task::spawn_blocking(move || {
            let mut db = db.lock().unwrap_or_else(PoisonError::into_inner);
            db.append_event(timestamp, connected, &device_name)
        })
        .await??;
        Ok(())
    }
}

/// Watcher settings.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Time between polls.
    pub interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
        }
    }
}

/// A phone the watcher currently considers attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownDevice {
    pub id: String,
    pub name: String,
}

/// Snapshot of the watcher for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherStatus {
    pub running: bool,
    pub interval_seconds: u64,
    pub known_devices: Vec<KnownDevice>,
    pub last_poll_at: Option<NaiveDateTime>,
    pub last_error: Option<String>,
}

/// A device returned by [`Watcher::scan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedDevice {
    pub id: String,
    #[serde(flatten)]
    pub device: UsbDevice,
    pub is_phone: bool,
}

/// Transitions recorded by one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub connected: Vec<KnownDevice>,
    pub disconnected: Vec<KnownDevice>,
}

impl PollOutcome {
    pub fn is_empty(&self) -> bool {
        self.connected.is_empty() && self.disconnected.is_empty()
    }
}

/// Enumerates devices once and flags the phones.
pub async fn scan_devices(
    enumerator: &dyn DeviceEnumerator,
    matcher: &PhoneMatcher,
) -> Result<Vec<ScannedDevice>, WatchError> {
    let devices = enumerator.enumerate().await?;
    Ok(devices
        .into_iter()
        .map(|device| ScannedDevice {
            id: device.id(),
            is_phone: matcher.is_phone(&device),
            device,
        })
        .collect())
}

/// Runs one-shot scans with the watcher's enumerator and matcher.
#[derive(Clone)]
pub struct Scanner {
    enumerator: Arc<dyn DeviceEnumerator>,
    matcher: PhoneMatcher,
}

impl Scanner {
    pub async fn scan(&self) -> Result<Vec<ScannedDevice>, WatchError> {
        scan_devices(self.enumerator.as_ref(), &self.matcher).await
    }
}

#[derive(Debug, Default)]
struct PollState {
    /// Phones seen attached, keyed by device id.
    known: BTreeMap<String, String>,
    last_poll_at: Option<NaiveDateTime>,
    last_error: Option<String>,
}

/// The part of the watcher shared with the polling task.
struct Poller {
    enumerator: Arc<dyn DeviceEnumerator>,
    matcher: PhoneMatcher,
    sink: Arc<dyn EventSink>,
    state: Mutex<PollState>,
    /// Held while a cycle diffs and records, so two cycles never emit the
    /// same transition.
    record_lock: tokio::sync::Mutex<()>,
}

impl Poller {
    fn state(&self) -> std::sync::MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn poll(&self) -> Result<PollOutcome, WatchError> {
        let devices = self.enumerator.enumerate().await;
        self.record(devices).await
    }

    /// Diffs one enumeration result against the known set and appends the
    /// transitions.
    async fn record(
        &self,
        devices: Result<Vec<UsbDevice>, WatchError>,
    ) -> Result<PollOutcome, WatchError> {
        let _guard = self.record_lock.lock().await;

        let devices = match devices {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "device enumeration failed");
                let mut state = self.state();
                state.last_poll_at = Some(now());
                state.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let current: BTreeMap<String, String> = devices
            .into_iter()
            .filter(|device| self.matcher.is_phone(device))
            .map(|device| (device.id(), device.name))
            .collect();

        let timestamp = now();
        let (gone, arrived) = {
            let mut state = self.state();
            state.last_poll_at = Some(timestamp);
            state.last_error = None;

            let gone: Vec<KnownDevice> = state
                .known
                .iter()
                .filter(|(id, _)| !current.contains_key(*id))
                .map(|(id, name)| KnownDevice {
                    id: id.clone(),
                    name: name.clone(),
                })
                .collect();
            let arrived: Vec<KnownDevice> = current
                .iter()
                .filter(|(id, _)| !state.known.contains_key(*id))
                .map(|(id, name)| KnownDevice {
                    id: id.clone(),
                    name: name.clone(),
                })
                .collect();
            (gone, arrived)
        };

        // Disconnects first so a phone swap ends with the new phone connected.
        // A transition that fails to append stays pending and is retried on
        // the next poll.
        let mut outcome = PollOutcome::default();
        for device in gone {
            match self.sink.append(timestamp, false, &device.name).await {
                Ok(()) => {
                    info!(id = %device.id, name = %device.name, "phone disconnected");
                    self.state().known.remove(&device.id);
                    outcome.disconnected.push(device);
                }
                Err(e) => {
                    warn!(id = %device.id, error = %e, "failed to record disconnect");
                    self.state().last_error = Some(e.to_string());
                }
            }
        }
        for device in arrived {
            match self.sink.append(timestamp, true, &device.name).await {
                Ok(()) => {
                    info!(id = %device.id, name = %device.name, "phone connected");
                    self.state()
                        .known
                        .insert(device.id.clone(), device.name.clone());
                    outcome.connected.push(device);
                }
                Err(e) => {
                    warn!(id = %device.id, error = %e, "failed to record connect");
                    self.state().last_error = Some(e.to_string());
                }
            }
        }

        Ok(outcome)
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Polls for phones in a background task.
///
/// The set of known phones lives as long as the watcher, so a phone that stays
/// attached across a stop and start is not recorded twice. Stopping does not
/// emit disconnects for phones that are still attached.
pub struct Watcher {
    config: WatcherConfig,
    poller: Arc<Poller>,
    handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
}

impl Watcher {
    pub fn new(
        config: WatcherConfig,
        enumerator: Arc<dyn DeviceEnumerator>,
        matcher: PhoneMatcher,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            poller: Arc::new(Poller {
                enumerator,
                matcher,
                sink,
                state: Mutex::new(PollState::default()),
                record_lock: tokio::sync::Mutex::new(()),
            }),
            handle: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Spawns the polling task. Returns `false` if it was already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }

        self.cancellation = CancellationToken::new();
        let cancel = self.cancellation.clone();
        let poller = Arc::clone(&self.poller);
        let interval = self.config.interval;
        self.handle = Some(tokio::spawn(async move {
            run(poller, interval, cancel).await;
        }));

        info!(?interval, "watcher started");
        true
    }

    /// Stops the polling task and waits for it to exit. Returns `false` if it
    /// was not running.
    pub async fn stop(&mut self) -> bool {
        if !self.is_running() {
            self.handle = None;
            return false;
        }

        self.cancellation.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "watcher task ended abnormally");
            }
        }

        info!("watcher stopped");
        true
    }

    pub fn status(&self) -> WatcherStatus {
        let state = self.poller.state();
        WatcherStatus {
            running: self.is_running(),
            interval_seconds: self.config.interval.as_secs(),
            known_devices: state
                .known
                .iter()
                .map(|(id, name)| KnownDevice {
                    id: id.clone(),
                    name: name.clone(),
                })
                .collect(),
            last_poll_at: state.last_poll_at,
            last_error: state.last_error.clone(),
        }
    }

    /// Enumerates devices once without touching the log.
    pub async fn scan(&self) -> Result<Vec<ScannedDevice>, WatchError> {
        self.scanner().scan().await
    }

    /// A handle for one-shot scans that does not borrow the watcher.
    pub fn scanner(&self) -> Scanner {
        Scanner {
            enumerator: Arc::clone(&self.poller.enumerator),
            matcher: self.poller.matcher.clone(),
        }
    }

    /// Runs a single poll cycle.
    ///
    /// On enumeration failure the known set is left as is, so a flaky
    /// enumerator never produces spurious disconnects.
    pub async fn poll_once(&self) -> Result<PollOutcome, WatchError> {
        self.poller.poll().await
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if self.is_running() {
            self.cancellation.cancel();
        }
    }
}

async fn run(poller: Arc<Poller>, interval: Duration, cancel: CancellationToken) {
    debug!("watcher loop running");
    loop {
        // Only enumeration races the stop signal. Once devices are listed the
        // cycle runs to completion so appends are never cut short.
        let devices = tokio::select! {
            () = cancel.cancelled() => break,
            devices = poller.enumerator.enumerate() => devices,
        };
        match poller.record(devices).await {
            Ok(outcome) if !outcome.is_empty() => debug!(
                connected = outcome.connected.len(),
                disconnected = outcome.disconnected.len(),
                "poll recorded transitions"
            ),
            // Failures are logged and recorded by the poller.
            _ => {}
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }
    debug!("watcher loop exited");
}
