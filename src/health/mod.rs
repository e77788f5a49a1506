//! Health check endpoints
//!
//! `/health` answers as long as the process runs. `/ready` turns 200 only
//! once the fleet has reached POSTLOAD. `/fleet` exposes the aggregated
//! fleet summary.

use crate::fleet::{Fleet, FleetStats, LifecyclePhase};
use crate::metrics::{self, FleetMetrics};
use crate::nats::NatsPublisher;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub phase: LifecyclePhase,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub phase: LifecyclePhase,
    pub shards_total: u32,
    pub shards_connected: usize,
    pub nats_connected: bool,
}

/// Application state for health endpoints
#[derive(Clone)]
pub struct AppState {
    pub fleet: Arc<Fleet>,
    pub nats: Option<Arc<NatsPublisher>>,
    pub metrics: Option<FleetMetrics>,
}

/// Create the health check router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .route("/fleet", get(fleet_handler))
        .with_state(state)
}

/// Health endpoint - always returns 200 if process is running
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        phase: state.fleet.phase(),
    })
}

/// Readiness endpoint - returns 200 once every module is active
async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    let phase = state.fleet.phase();
    let ready = phase == LifecyclePhase::PostLoad;

    let response = ReadyResponse {
        ready,
        phase,
        shards_total: state.fleet.total_shards(),
        shards_connected: state.fleet.connected_count(),
        nats_connected: state.nats.as_ref().is_some_and(|n| n.is_connected()),
    };

    if ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Metrics endpoint - returns Prometheus format metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let Some(ref recorder) = state.metrics else {
        return (
            StatusCode::NOT_FOUND,
            [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "metrics recorder not installed\n".to_string(),
        );
    };

    metrics::set_shards_connected(state.fleet.connected_count());
    if let Some(ref nats) = state.nats {
        metrics::set_nats_connected(nats.is_connected());
    }

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        recorder.render(),
    )
}

/// Fleet summary endpoint
async fn fleet_handler(State(state): State<AppState>) -> Json<FleetStats> {
    Json(state.fleet.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::PhaseTracker;
    use axum::response::Response;
    use std::num::NonZeroU32;

    fn state(total: u32) -> AppState {
        let fleet = Fleet::new(NonZeroU32::new(total).unwrap(), Arc::new(PhaseTracker::new()));
        AppState {
            fleet: Arc::new(fleet),
            nats: None,
            metrics: None,
        }
    }

    async fn ready(state: &AppState) -> Response {
        ready_handler(State(state.clone())).await.into_response()
    }

    #[tokio::test]
    async fn test_ready_only_at_post_load() {
        let state = state(2);
        assert_eq!(ready(&state).await.status(), StatusCode::SERVICE_UNAVAILABLE);

        for phase in &LifecyclePhase::ALL[1..] {
            state.fleet.phases().advance(*phase).unwrap();
            let expected = if *phase == LifecyclePhase::PostLoad {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            assert_eq!(ready(&state).await.status(), expected);
        }
    }

    #[tokio::test]
    async fn test_health_is_always_ok() {
        let response = health_handler(State(state(1))).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let response = metrics_handler(State(state(1))).await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fleet_summary() {
        let Json(stats) = fleet_handler(State(state(3))).await;
        assert_eq!(stats.total_shards, 3);
        assert_eq!(stats.shards.len(), 3);
    }

    #[test]
    fn test_ready_response_serialization() {
        let response = ReadyResponse {
            ready: false,
            phase: LifecyclePhase::Loading,
            shards_total: 25,
            shards_connected: 12,
            nats_connected: true,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"ready\":false"));
        assert!(json.contains("\"phase\":\"LOADING\""));
    }
}
