//! HTTP ingress for the alert evaluator.
//!
//! Routes:
//! - `GET  /`                        health
//! - `POST /update`                  evaluate one sample
//! - `POST /api/register_fcm_token`  set the notification destination
//! - `GET  /data`                    latest stored reading
//! - `GET  /api/chart_data`          last 300 readings, oldest first
//! - `GET  /api/history_by_date`     readings of one UTC day, newest first
//! - `POST /admin/force_sync`        flush the forwarding outbox now
//!
//! The predictor, store, notifier and mirror clients all block, so every
//! handler that touches them runs on tokio's blocking pool. The evaluator
//! sits behind a mutex and concurrent `/update` calls are processed one at a
//! time.

use crate::alert::evaluator::{Dependencies, EvaluatorState};
use crate::config::FloodConfig;
use crate::db;
use crate::degrade;
use crate::ingest::parse_update;
use crate::logging::{self, Component};
use crate::model::{PredictError, StoreError, StoredReading, ValidationError};
use crate::notify::{FcmNotifier, LogNotifier, Notifier};
use crate::predictor::{HttpPredictor, Predictor};
use crate::store::{MemoryStore, ReadingStore};
use crate::sync::{FlushReport, MirrorPayload, SyncError, SyncOutbox};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;

/// Rows returned by `/api/chart_data`.
pub const CHART_ROWS: usize = 300;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("predictor client: {0}")]
    Predictor(#[from] PredictError),

    #[error("sync outbox: {0}")]
    Sync(#[from] SyncError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

pub struct AppState {
    evaluator: Mutex<EvaluatorState>,
    predictor: Box<dyn Predictor>,
    store: Box<dyn ReadingStore>,
    notifier: Box<dyn Notifier>,
    outbox: SyncOutbox,
    clock: Clock,
}

impl AppState {
    pub fn new(
        evaluator: EvaluatorState,
        predictor: Box<dyn Predictor>,
        store: Box<dyn ReadingStore>,
        notifier: Box<dyn Notifier>,
        outbox: SyncOutbox,
    ) -> Self {
        AppState {
            evaluator: Mutex::new(evaluator),
            predictor,
            store,
            notifier,
            outbox,
            clock: Box::new(|| Utc::now().timestamp_millis()),
        }
    }

    /// Replaces the wall clock, e.g. with a scripted one in tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Wires the production collaborators from configuration.
    ///
    /// An unreachable database falls back to the in-memory store and missing
    /// FCM credentials fall back to log-only notifications.
    pub fn from_config(config: &FloodConfig) -> Result<Self, ServerError> {
        let service = &config.service;

        let predictor = HttpPredictor::new(
            &service.predictor_url,
            Duration::from_secs(service.predictor_timeout_secs),
        )?;

        let store: Box<dyn ReadingStore> = match service.database_url.as_deref() {
            Some(url) => match db::connect(url) {
                Ok(pg) => Box::new(pg),
                Err(e) => {
                    logging::error(
                        Component::Database,
                        None,
                        &format!("connect failed, using in-memory store: {}", e),
                    );
                    Box::new(MemoryStore::new(service.memory_store_capacity))
                }
            },
            None => {
                logging::warn(
                    Component::Database,
                    None,
                    "no database configured, using in-memory store",
                );
                Box::new(MemoryStore::new(service.memory_store_capacity))
            }
        };

        let notifier: Box<dyn Notifier> =
            match (&service.fcm_project_id, &service.fcm_access_token) {
                (Some(project), Some(token)) => match FcmNotifier::new(project, token) {
                    Ok(fcm) => Box::new(fcm),
                    Err(e) => {
                        logging::error(
                            Component::Notify,
                            None,
                            &format!("FCM client failed, notifications are log-only: {}", e),
                        );
                        Box::new(LogNotifier)
                    }
                },
                _ => {
                    logging::warn(
                        Component::Notify,
                        None,
                        "FCM not configured, notifications are log-only",
                    );
                    Box::new(LogNotifier)
                }
            };

        let outbox = SyncOutbox::from_url(service.sync_url.as_deref(), &service.outbox_path)?;

        Ok(AppState::new(
            EvaluatorState::new(config.alerts.clone()),
            Box::new(predictor),
            store,
            notifier,
            outbox,
        ))
    }

    fn evaluator(&self) -> MutexGuard<'_, EvaluatorState> {
        // A panic mid-sample leaves the state as of the last completed step,
        // which is still a usable basis for the next sample.
        self.evaluator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn store(&self) -> &dyn ReadingStore {
        self.store.as_ref()
    }

    pub fn outbox(&self) -> &SyncOutbox {
        &self.outbox
    }

    pub fn device_token(&self) -> Option<String> {
        self.evaluator().device_token().map(String::from)
    }

    // -----------------------------------------------------------------------
    // Blocking operations behind the routes
    // -----------------------------------------------------------------------

    /// Validates and evaluates one `/update` body.
    pub fn handle_update(&self, body: &Value) -> Result<UpdateResponse, ValidationError> {
        let update = parse_update(body)?;

        let outcome = {
            let mut evaluator = self.evaluator();
            let deps = Dependencies {
                predictor: self.predictor.as_ref(),
                store: self.store.as_ref(),
                notifier: self.notifier.as_ref(),
            };
            evaluator.process(&update, (self.clock)(), &deps)
        };

        if self.outbox.is_enabled() {
            let payload = match &outcome.stored {
                Some(row) => MirrorPayload::from_stored(row),
                None => MirrorPayload::new(&outcome.record, Utc::now()),
            };
            self.outbox.forward(&payload);
        }

        Ok(UpdateResponse {
            message: "Processed and saved".to_string(),
            prediction_status: outcome.prediction.status,
            prediction_time: outcome.prediction.seconds,
        })
    }

    pub fn register_token(&self, body: &Value) -> Result<(), ValidationError> {
        let token = body
            .get("token")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ValidationError::MissingField("token"))?;
        self.evaluator().register_token(token);
        Ok(())
    }

    pub fn force_sync(&self) -> FlushReport {
        degrade::or_fallback(
            self.outbox.flush(),
            Component::Sync,
            "flush outbox",
            FlushReport::default(),
        )
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub message: String,
    pub prediction_status: String,
    pub prediction_time: f64,
}

#[derive(Debug, Serialize)]
pub struct ChartPoint {
    pub id: i64,
    pub level_a: f64,
    pub level_b: f64,
    pub flow: f64,
    pub predicted_status: String,
    pub created_at: String,
}

impl From<&StoredReading> for ChartPoint {
    fn from(row: &StoredReading) -> Self {
        ChartPoint {
            id: row.id,
            level_a: row.record.level_a_cm,
            level_b: row.record.level_b_cm,
            flow: row.record.flow_m3s,
            predicted_status: row.record.predicted_status.clone(),
            created_at: row.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub date: Option<String>,
}

/// Route-level failures, rendered as `{ "error": ... }`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("storage unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("worker failed: {0}")]
    Worker(String),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_) | ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            logging::error(Component::Http, None, &self.to_string());
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn blocking<T, F>(state: &Arc<AppState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> T + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| ApiError::Worker(e.to_string()))
}

fn parse_json(body: &Bytes) -> Result<Value, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::from(ValidationError::MalformedBody(e.to_string())))
}

/// Parses a strict `YYYY-MM-DD` date.
pub fn parse_history_date(raw: Option<&str>) -> Result<NaiveDate, ApiError> {
    let raw = raw
        .map(str::trim)
        .filter(|d| d.len() == 10)
        .ok_or_else(|| ApiError::BadRequest("missing or malformed date (YYYY-MM-DD)".into()))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("missing or malformed date (YYYY-MM-DD)".into()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "now": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

async fn update_handler(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<UpdateResponse> {
    let value = parse_json(&body)?;
    let response = blocking(&state, move |s| s.handle_update(&value)).await?;
    match response {
        Ok(response) => Ok(Json(response)),
        Err(err) => {
            logging::warn(Component::Http, Some("/update"), &format!("rejected: {}", err));
            Err(err.into())
        }
    }
}

async fn register_token_handler(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<Value> {
    let value = parse_json(&body)?;
    // Waits on the evaluator lock, which an in-flight `/update` holds
    // across predictor and notifier I/O.
    blocking(&state, move |s| s.register_token(&value)).await??;
    Ok(Json(json!({ "message": "OK" })))
}

async fn latest_handler(State(state): State<Arc<AppState>>) -> ApiResult<StoredReading> {
    blocking(&state, |s| s.store.latest())
        .await??
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No data yet.".into()))
}

async fn chart_handler(State(state): State<Arc<AppState>>) -> ApiResult<Vec<ChartPoint>> {
    let rows = blocking(&state, |s| s.store.recent(CHART_ROWS)).await??;
    Ok(Json(rows.iter().map(ChartPoint::from).collect()))
}

async fn history_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<StoredReading>> {
    let date = parse_history_date(query.date.as_deref())?;
    let rows = blocking(&state, move |s| s.store.on_date(date)).await??;
    Ok(Json(rows))
}

async fn force_sync_handler(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    let report = blocking(&state, |s| s.force_sync()).await?;
    Ok(Json(json!({
        "message": "Attempted sync",
        "total": report.total,
        "delivered": report.delivered,
        "kept": report.kept,
    })))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/update", post(update_handler))
        .route("/api/register_fcm_token", post(register_token_handler))
        .route("/data", get(latest_handler))
        .route("/api/chart_data", get(chart_handler))
        .route("/api/history_by_date", get(history_handler))
        .route("/admin/force_sync", post(force_sync_handler))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Flushes the outbox every `interval` until the runtime shuts down.
pub fn spawn_flush_task(state: Arc<AppState>, interval: Duration) {
    if !state.outbox.is_enabled() {
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it so startup is quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let state = Arc::clone(&state);
            if let Err(e) = tokio::task::spawn_blocking(move || state.force_sync()).await {
                logging::error(Component::Sync, None, &format!("flush task failed: {}", e));
            }
        }
    });
}

pub async fn serve(config: FloodConfig) -> Result<(), ServerError> {
    let service = config.service.clone();
    let state = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || AppState::from_config(&config))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))??
    };
    let state = Arc::new(state);

    spawn_flush_task(Arc::clone(&state), Duration::from_millis(service.sync_interval_ms));

    let addr = SocketAddr::from(([0, 0, 0, 0], service.port));
    logging::info(Component::System, None, &format!("listening on http://{}", addr));
    logging::info(
        Component::System,
        None,
        &format!("predictor at {}", service.predictor_url),
    );
    if let Some(url) = &service.sync_url {
        logging::info(Component::Sync, None, &format!("mirroring readings to {}", url));
    }

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
