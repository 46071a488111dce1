//! Sensorlog HTTP server
//!
//! Wires the session recorder, metrics and health endpoints into one axum
//! application.

pub mod api;
pub mod config;
pub mod readiness;

use axum::Router;
use sensorlog_observability::{HealthState, health_router};
use tower_http::trace::TraceLayer;

pub use api::{AppState, router};
pub use config::{ConfigError, LoggingConfig, ServerConfig};
pub use readiness::StorageReadiness;

/// Full application: recording API plus health and metrics
pub fn app(state: AppState, health: HealthState) -> Router {
    router(state)
        .merge(health_router(health))
        .layer(TraceLayer::new_for_http())
}
