//! Health, liveness, and readiness endpoints served by every service.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use super::shutdown::{HealthState, ShutdownController};

#[derive(Clone)]
struct HealthContext {
    service: &'static str,
    started: Instant,
    shutdown: Arc<ShutdownController>,
}

/// Detailed health JSON. Always 200; the `state` field distinguishes
/// "up but draining" from "down" for monitoring.
async fn health(State(ctx): State<HealthContext>) -> Json<serde_json::Value> {
    Json(json!({
        "service": ctx.service,
        "state": ctx.shutdown.health_state().as_str(),
        "uptime_secs": ctx.started.elapsed().as_secs(),
    }))
}

/// Liveness probe: only answers "the process runs", so restarts are not
/// triggered by downstream trouble.
async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 only in the `Ready` state, removing the instance
/// from load-balancer rotation during startup and drain.
async fn readiness(State(ctx): State<HealthContext>) -> StatusCode {
    if ctx.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Routes: `GET /health`, `GET /health/live`, `GET /health/ready`.
#[must_use]
pub fn health_router(service: &'static str, shutdown: Arc<ShutdownController>) -> Router {
    let ctx = HealthContext {
        service,
        started: Instant::now(),
        shutdown,
    };
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .with_state(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(shutdown: &Arc<ShutdownController>) -> HealthContext {
        HealthContext {
            service: "questions",
            started: Instant::now(),
            shutdown: Arc::clone(shutdown),
        }
    }

    #[tokio::test]
    async fn health_reports_service_and_state() {
        let shutdown = Arc::new(ShutdownController::new());
        shutdown.set_ready();

        let response = health(State(ctx(&shutdown))).await;
        assert_eq!(response.0["service"], "questions");
        assert_eq!(response.0["state"], "ready");
        assert!(response.0["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        assert_eq!(liveness().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_tracks_state_machine() {
        let shutdown = Arc::new(ShutdownController::new());
        assert_eq!(
            readiness(State(ctx(&shutdown))).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        shutdown.set_ready();
        assert_eq!(readiness(State(ctx(&shutdown))).await, StatusCode::OK);

        shutdown.trigger_shutdown();
        assert_eq!(
            readiness(State(ctx(&shutdown))).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
