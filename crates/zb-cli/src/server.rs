//! HTTP API for the web front end.
//!
//! Appends go through one shared writer connection. Every read handler opens
//! its own connection, so reads never wait on the writer lock and always see
//! whole records.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};
use zb_core::{
    DailyTarget, Session, StatsSnapshot, compute_stats, format_timestamp, is_zen_mode,
    parse_timestamp, reconstruct_sessions,
};
use zb_db::{ConfigPatch, Database, DbError, EventRecord, SettingsError, SettingsStore};
use zb_watch::{
    DatabaseSink, DeviceEnumerator, LsusbEnumerator, PhoneMatcher, Scanner, WatchError, Watcher,
    WatcherConfig,
};

use crate::Config;
use crate::commands::{now, open_database};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    database_path: PathBuf,
    writer: Arc<Mutex<Database>>,
    settings: Arc<SettingsStore>,
    watcher: Arc<tokio::sync::Mutex<Watcher>>,
    /// Scans bypass the watcher lock so a slow enumeration never holds up
    /// monitor calls.
    scanner: Scanner,
}

impl AppState {
    /// Opens storage, migrates user settings, and builds a stopped watcher.
    pub fn new(config: &Config, enumerator: Arc<dyn DeviceEnumerator>) -> anyhow::Result<Self> {
        let writer = Arc::new(Mutex::new(open_database(config)?));

        let settings = SettingsStore::new(config.settings_path());
        let user_config = settings.load().context("failed to load user settings")?;
        debug!(daily_target = %user_config.daily_target, "user settings loaded");

        let matcher = PhoneMatcher::new(&config.watcher.phone_patterns)
            .context("invalid phone pattern in configuration")?;
        let watcher = Watcher::new(
            WatcherConfig {
                interval: config.watcher.interval(),
            },
            enumerator,
            matcher,
            Arc::new(DatabaseSink::new(Arc::clone(&writer))),
        );
        let scanner = watcher.scanner();

        Ok(Self {
            database_path: config.database_path(),
            writer,
            settings: Arc::new(settings),
            watcher: Arc::new(tokio::sync::Mutex::new(watcher)),
            scanner,
        })
    }

    /// Opens a fresh read connection.
    fn reader(&self) -> Result<Database, DbError> {
        Database::open(&self.database_path)
    }

    /// Appends on the blocking pool, serialized by the writer lock.
    async fn append(&self, connected: bool, device_name: String) -> ApiResult<EventRecord> {
        let writer = Arc::clone(&self.writer);
        let record = tokio::task::spawn_blocking(move || {
            let mut db = writer.lock().unwrap_or_else(PoisonError::into_inner);
            db.append_event(now(), connected, &device_name)
        })
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;
        Ok(record)
    }

    fn stats(&self, target: DailyTarget) -> anyhow::Result<StatsSnapshot> {
        let events = self.reader()?.list_events()?;
        Ok(compute_stats(&events, target, now()))
    }
}

/// Errors returned to API clients as `{status: "error", message}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unavailable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Unavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
            Self::Internal(e) => {
                error!(error = %format!("{e:#}"), "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(json!({ "status": "error", "message": message }))).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        Self::Internal(e.into())
    }
}

impl From<SettingsError> for ApiError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::Validation(e) => Self::BadRequest(e.to_string()),
            other => Self::Internal(other.into()),
        }
    }
}

impl From<WatchError> for ApiError {
    fn from(e: WatchError) -> Self {
        Self::Unavailable(e.to_string())
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/data", get(list_events))
        .route("/api/device/connected", post(device_connected))
        .route("/api/device/disconnected", post(device_disconnected))
        .route("/api/device/stats", get(device_stats))
        .route("/api/user/config", get(get_user_config).put(put_user_config))
        .route("/api/user/daily-target", put(put_daily_target))
        .route("/api/device/monitor/status", get(monitor_status))
        .route("/api/device/monitor/start", post(monitor_start))
        .route("/api/device/monitor/stop", post(monitor_stop))
        .route("/api/device/scan", get(device_scan))
        .route("/api/debug/events", get(debug_events))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Runs the API until Ctrl-C, then stops the watcher.
pub async fn serve(config: &Config, bind: &str, watch: bool) -> anyhow::Result<()> {
    let enumerator = Arc::new(LsusbEnumerator::new(config.watcher.command_timeout()));
    let state = AppState::new(config, enumerator)?;

    if watch {
        state.watcher.lock().await.start();
    }

    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(addr = %listener.local_addr()?, "zenbox API listening");

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.watcher.lock().await.stop().await;
    info!("zenbox API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// Parses a request body that must be a JSON object.
fn parse_object(body: &Bytes) -> ApiResult<serde_json::Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::BadRequest(
            "request body must be a JSON object".to_string(),
        )),
        Err(e) => Err(ApiError::BadRequest(format!("invalid JSON body: {e}"))),
    }
}

/// Reads `dailyTarget`, which must be an integer when present.
fn daily_target_field(body: &serde_json::Map<String, Value>) -> ApiResult<Option<i64>> {
    match body.get("dailyTarget") {
        None => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or_else(|| {
            ApiError::BadRequest(format!("dailyTarget must be an integer, got {value}"))
        }),
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": format_timestamp(now()),
    }))
}

async fn list_events(State(state): State<AppState>) -> ApiResult<Json<Vec<EventRecord>>> {
    Ok(Json(state.reader()?.list_events()?))
}

async fn device_connected(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    record_device_event(&state, true, &body).await
}

async fn device_disconnected(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    record_device_event(&state, false, &body).await
}

async fn record_device_event(
    state: &AppState,
    connected: bool,
    body: &Bytes,
) -> ApiResult<Json<Value>> {
    let device_name = if body.iter().all(u8::is_ascii_whitespace) {
        String::new()
    } else {
        match parse_object(body)?.get("deviceName") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(ApiError::BadRequest(format!(
                    "deviceName must be a string, got {other}"
                )));
            }
        }
    };

    let record = state.append(connected, device_name.clone()).await?;
    info!(seq = record.seq, connected, device = %device_name, "device event recorded");

    let message = if connected {
        "Device connection logged"
    } else {
        "Device disconnection logged"
    };
    Ok(Json(json!({ "status": "success", "message": message })))
}

async fn device_stats(State(state): State<AppState>) -> Response {
    let target = match state.settings.daily_target() {
        Ok(target) => target,
        Err(e) => {
            warn!(error = %e, "falling back to default daily target");
            DailyTarget::default()
        }
    };

    match state.stats(target) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => {
            error!(error = %format!("{e:#}"), "failed to compute stats");
            let snapshot = StatsSnapshot::zeroed(target, now()).with_error(e.to_string());
            (StatusCode::INTERNAL_SERVER_ERROR, Json(snapshot)).into_response()
        }
    }
}

async fn get_user_config(State(state): State<AppState>) -> ApiResult<Response> {
    Ok(Json(state.settings.load()?).into_response())
}

async fn put_user_config(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let mut body = parse_object(&body)?;
    let daily_target = daily_target_field(&body)?;
    let settings = match body.remove("settings") {
        None => None,
        Some(Value::Object(settings)) => Some(settings),
        Some(other) => {
            return Err(ApiError::BadRequest(format!(
                "settings must be an object, got {other}"
            )));
        }
    };

    let config = state.settings.update(ConfigPatch {
        daily_target,
        settings,
    })?;
    Ok(Json(config).into_response())
}

async fn put_daily_target(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    let body = parse_object(&body)?;
    let minutes = daily_target_field(&body)?
        .ok_or_else(|| ApiError::BadRequest("dailyTarget is required".to_string()))?;

    let config = state.settings.set_daily_target(minutes)?;
    info!(daily_target = %config.daily_target, "daily target updated");
    Ok(Json(json!({
        "status": "success",
        "message": format!("Daily target set to {} minutes", config.daily_target.minutes()),
        "dailyTarget": config.daily_target,
    })))
}

async fn monitor_status(State(state): State<AppState>) -> Response {
    Json(state.watcher.lock().await.status()).into_response()
}

async fn monitor_start(State(state): State<AppState>) -> Json<Value> {
    let mut watcher = state.watcher.lock().await;
    let message = if watcher.start() {
        "Device monitoring started"
    } else {
        "Device monitoring already running"
    };
    Json(json!({
        "status": "success",
        "message": message,
        "running": watcher.is_running(),
    }))
}

async fn monitor_stop(State(state): State<AppState>) -> Json<Value> {
    let mut watcher = state.watcher.lock().await;
    let message = if watcher.stop().await {
        "Device monitoring stopped"
    } else {
        "Device monitoring already stopped"
    };
    Json(json!({
        "status": "success",
        "message": message,
        "running": watcher.is_running(),
    }))
}

async fn device_scan(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let devices = state.scanner.scan().await?;
    let phones = devices.iter().filter(|d| d.is_phone).count();
    Ok(Json(json!({ "devices": devices, "phoneCount": phones })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DebugEvent {
    #[serde(flatten)]
    event: EventRecord,
    parsed_timestamp: Option<NaiveDateTime>,
    valid_timestamp: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DebugReport {
    count: u64,
    last_event: Option<EventRecord>,
    invalid_count: usize,
    is_zen_mode: bool,
    events: Vec<DebugEvent>,
    sessions: Vec<Session>,
}

async fn debug_events(State(state): State<AppState>) -> ApiResult<Json<DebugReport>> {
    let db = state.reader()?;
    let count = db.event_count()?;
    let last_event = db.last_event()?;
    let events = db.list_events()?;

    let sessions = reconstruct_sessions(&events, now());
    let is_zen_mode = is_zen_mode(&events);
    let events: Vec<DebugEvent> = events
        .into_iter()
        .map(|event| {
            let parsed_timestamp = parse_timestamp(&event.timestamp);
            DebugEvent {
                valid_timestamp: parsed_timestamp.is_some(),
                parsed_timestamp,
                event,
            }
        })
        .collect();
    let invalid_count = events.iter().filter(|e| !e.valid_timestamp).count();

    Ok(Json(DebugReport {
        count,
        last_event,
        invalid_count,
        is_zen_mode,
        events,
        sessions,
    }))
}
