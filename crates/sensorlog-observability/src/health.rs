//! Health endpoints
//!
//! - `/healthz` - Liveness check, 200 while the process serves requests
//! - `/readyz` - Readiness check, 503 if any storage check fails
//! - `/metrics` - Prometheus text exposition

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::TextEncoder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::metrics::Metrics;

/// Liveness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub checks: Vec<CheckStatus>,
}

/// One named readiness check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStatus {
    pub name: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckStatus {
    pub fn ok(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: true,
            detail: None,
        }
    }

    pub fn failed(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

/// Source of readiness checks
pub trait ReadinessChecker: Send + Sync {
    fn checks(&self) -> Vec<CheckStatus>;
}

/// Shared state of the health router
#[derive(Clone)]
pub struct HealthState {
    pub metrics: Arc<Metrics>,
    pub readiness_checker: Option<Arc<dyn ReadinessChecker>>,
}

impl HealthState {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            readiness_checker: None,
        }
    }

    pub fn with_readiness_checker(
        metrics: Arc<Metrics>,
        readiness_checker: Arc<dyn ReadinessChecker>,
    ) -> Self {
        Self {
            metrics,
            readiness_checker: Some(readiness_checker),
        }
    }
}

/// Create health check router
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn readyz(State(state): State<HealthState>) -> Response {
    let checks = state
        .readiness_checker
        .as_ref()
        .map(|checker| checker.checks())
        .unwrap_or_default();

    if checks.iter().all(|c| c.ok) {
        (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready".to_string(),
                checks,
            }),
        )
            .into_response()
    } else {
        for check in checks.iter().filter(|c| !c.ok) {
            tracing::warn!(check = %check.name, detail = ?check.detail, "Readiness check failed");
        }
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready".to_string(),
                checks,
            }),
        )
            .into_response()
    }
}

async fn metrics_handler(State(state): State<HealthState>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(body) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", err),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt; // for oneshot

    struct FixedChecks(Vec<CheckStatus>);

    impl ReadinessChecker for FixedChecks {
        fn checks(&self) -> Vec<CheckStatus> {
            self.0.clone()
        }
    }

    async fn get_status(state: HealthState, uri: &str) -> StatusCode {
        health_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_healthz() {
        let state = HealthState::new(Arc::new(Metrics::new().unwrap()));
        assert_eq!(get_status(state, "/healthz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readyz_all_checks_pass() {
        let checker = Arc::new(FixedChecks(vec![CheckStatus::ok("data_dir")]));
        let state = HealthState::with_readiness_checker(Arc::new(Metrics::new().unwrap()), checker);
        assert_eq!(get_status(state, "/readyz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readyz_failed_check() {
        let checker = Arc::new(FixedChecks(vec![
            CheckStatus::ok("data_dir"),
            CheckStatus::failed("archive_dir", "permission denied"),
        ]));
        let state = HealthState::with_readiness_checker(Arc::new(Metrics::new().unwrap()), checker);
        assert_eq!(
            get_status(state, "/readyz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_readyz_no_checker() {
        let state = HealthState::new(Arc::new(Metrics::new().unwrap()));
        assert_eq!(get_status(state, "/readyz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.record_session_started(false);
        let app = health_router(HealthState::new(metrics));

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain; version=0.0.4"
        );
    }

    #[test]
    fn test_readiness_response_serialization() {
        let ready = serde_json::to_value(ReadinessResponse {
            status: "ready".to_string(),
            checks: vec![],
        })
        .unwrap();
        assert_eq!(ready, serde_json::json!({"status": "ready"}));

        let json = serde_json::to_string(&CheckStatus::failed("data_dir", "missing")).unwrap();
        assert!(json.contains("\"ok\":false"));
        assert!(json.contains("\"detail\":\"missing\""));
    }
}
