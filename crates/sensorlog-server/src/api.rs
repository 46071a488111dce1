//! HTTP API for recording sessions
//!
//! Handlers are thin: they decode the request, run the recorder call on the
//! blocking pool (every call that can touch disk), and map the outcome to a
//! status code and JSON body.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use sensorlog_core::Error;
use sensorlog_observability::{BatchOutcome, Metrics};
use sensorlog_session::{
    DeviceSummary, IngestOutcome, SessionRecorder, SessionStarted, StatusReport,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Instant;

/// Response header carrying the stopped session's ID
pub const SESSION_ID_HEADER: HeaderName = HeaderName::from_static("x-session-id");

/// Default request body limit (16 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared state of the API router
#[derive(Clone)]
pub struct AppState {
    pub recorder: Arc<SessionRecorder>,
    pub metrics: Arc<Metrics>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(recorder: Arc<SessionRecorder>, metrics: Arc<Metrics>) -> Self {
        Self {
            recorder,
            metrics,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_body_limit(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    async fn ingest(
        &self,
        device_id: String,
        samples: Vec<Value>,
        started: Instant,
    ) -> Result<Json<IngestOutcome>, ApiError> {
        let recorder = Arc::clone(&self.recorder);
        let result = run_blocking(move || recorder.ingest(&device_id, samples)).await;

        let (outcome, rows) = match &result {
            Ok(o) if o.stored => (BatchOutcome::Stored, o.written),
            Ok(_) => (BatchOutcome::Dropped, 0),
            Err(e) => (e.batch_outcome(), 0),
        };
        self.metrics.record_batch(outcome, rows, started.elapsed().as_secs_f64());

        result.map(Json)
    }

    /// Count a request rejected before it reached the recorder
    fn reject(&self, err: ApiError, started: Instant) -> ApiError {
        self.metrics.record_batch(err.batch_outcome(), 0, started.elapsed().as_secs_f64());
        err
    }
}

/// Body of `POST /api/ingest`
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub device_id: String,
    pub samples: Vec<Value>,
}

/// Body of `GET /api/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: StatusReport,
    pub devices: Vec<DeviceSummary>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Error returned by API handlers
#[derive(Debug)]
pub enum ApiError {
    Recorder(Error),
    PayloadTooLarge(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Recorder(Error::InvalidPayload(_)) => StatusCode::BAD_REQUEST,
            ApiError::Recorder(Error::SchemaMismatch { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Recorder(Error::NoActiveSession) => StatusCode::CONFLICT,
            ApiError::Recorder(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Recorder(e) => e.code(),
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn batch_outcome(&self) -> BatchOutcome {
        match self {
            ApiError::Recorder(Error::InvalidPayload(_)) | ApiError::PayloadTooLarge(_) => {
                BatchOutcome::InvalidPayload
            }
            ApiError::Recorder(Error::SchemaMismatch { .. }) => BatchOutcome::SchemaMismatch,
            _ => BatchOutcome::StorageError,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Recorder(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::Recorder(Error::InvalidPayload(rejection.body_text()))
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Recorder(e) => e.to_string(),
            ApiError::PayloadTooLarge(m) | ApiError::Internal(m) => m.clone(),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %message, "Request rejected");
        }

        (
            status,
            Json(ErrorBody {
                error: self.code(),
                message,
            }),
        )
            .into_response()
    }
}

/// Run a recorder call on the blocking pool
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> sensorlog_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("Blocking task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Create the API router
pub fn router(state: AppState) -> Router {
    let max_body_bytes = state.max_body_bytes;

    Router::new()
        .route("/", get(root))
        .route("/api/session/start", post(start_session))
        .route("/api/session/stop", post(stop_session))
        .route("/api/status", get(status))
        .route("/api/ingest", post(ingest))
        .route("/api/measurement", post(measurement))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Sensor session logging API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /api/session/start": "Start a recording session (no-op if one is running)",
            "POST /api/session/stop": "Stop the session and download its ZIP archive",
            "GET  /api/status": "Recording state, session start time and devices seen",
            "POST /api/ingest": "Send a batch of samples for one device",
            "POST /api/measurement": "Send one flat reading with a device_id",
        },
    }))
}

async fn start_session(State(state): State<AppState>) -> Json<SessionStarted> {
    let started = state.recorder.start_session();
    state.metrics.record_session_started(started.already_running);
    Json(started)
}

async fn stop_session(State(state): State<AppState>) -> Result<Response, ApiError> {
    let recorder = Arc::clone(&state.recorder);
    let stopped = run_blocking(move || recorder.stop_session()).await?;
    state
        .metrics
        .record_session_stopped(stopped.archive.bytes.len());

    let disposition = format!("attachment; filename=\"{}\"", stopped.archive.file_name);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (SESSION_ID_HEADER, stopped.session_id.to_string()),
        ],
        stopped.archive.bytes,
    )
        .into_response())
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.recorder.query_status(),
        devices: state.recorder.devices(),
    })
}

async fn ingest(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestOutcome>, ApiError> {
    let started = Instant::now();
    let Json(request) = payload.map_err(|e| state.reject(e.into(), started))?;
    state
        .ingest(request.device_id, request.samples, started)
        .await
}

/// Single flat reading: `device_id` plus data fields
async fn measurement(
    State(state): State<AppState>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<IngestOutcome>, ApiError> {
    let started = Instant::now();
    let Json(mut reading) = payload.map_err(|e| state.reject(e.into(), started))?;

    let device_id = match reading.remove("device_id") {
        Some(Value::String(id)) => id,
        Some(_) => {
            return Err(state.reject(
                Error::InvalidPayload("device_id must be a string".to_string()).into(),
                started,
            ));
        }
        None => {
            return Err(state.reject(
                Error::InvalidPayload("missing device_id".to_string()).into(),
                started,
            ));
        }
    };

    state
        .ingest(device_id, vec![Value::Object(reading)], started)
        .await
}
