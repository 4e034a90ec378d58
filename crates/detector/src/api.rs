//! HTTP API for health checks, Prometheus metrics and the actuator service

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use detector_lib::health::{ComponentStatus, HealthRegistry};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tracing::{error, info};

use crate::actuator::{self, ActuatorState};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry) -> Self {
        Self { health_registry }
    }
}

/// 200 while operational (degraded included), 503 when unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Health and metrics routes, plus `POST /action` when the actuator is enabled
pub fn create_router(state: Arc<AppState>, actuator: Option<Arc<ActuatorState>>) -> Router {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state);

    match actuator {
        Some(actuator_state) => router.merge(actuator::router(actuator_state)),
        None => router,
    }
}

pub async fn serve(port: u16, router: Router) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use detector_lib::actuator::{ActionExecutor, ActionOutcome, Trigger};
    use detector_lib::health::{components, HealthResponse, ReadinessResponse};
    use detector_lib::models::{ActionKind, ActionTarget};
    use detector_lib::observability::DetectorMetrics;
    use tower::ServiceExt;

    struct NoopExecutor;

    #[async_trait]
    impl ActionExecutor for NoopExecutor {
        async fn execute(&self, _: &ActionKind, _: &ActionTarget, _: &Trigger) -> ActionOutcome {
            ActionOutcome::success("noop")
        }
    }

    async fn setup() -> (HealthRegistry, Router) {
        let registry = HealthRegistry::new();
        registry.register_all().await;
        let router = create_router(Arc::new(AppState::new(registry.clone())), None);
        (registry, router)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        router: Router,
        uri: &str,
    ) -> (StatusCode, T) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_healthz_lists_components() {
        let (_, router) = setup().await;
        let (status, health): (_, HealthResponse) = get_json(router, "/healthz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.contains_key(components::METRIC_SOURCE));
        assert!(health.components.contains_key(components::EXECUTOR));
        assert!(health.components.contains_key(components::CONTROL_LOOP));
    }

    #[tokio::test]
    async fn test_healthz_degraded_still_ok() {
        let (registry, router) = setup().await;
        registry
            .set_degraded(components::METRIC_SOURCE, "1 of 3 queries failed")
            .await;

        let (status, health): (_, HealthResponse) = get_json(router, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, ComponentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_healthz_unhealthy_is_503() {
        let (registry, router) = setup().await;
        registry
            .set_unhealthy(components::CONTROL_LOOP, "loop exited")
            .await;

        let (status, _): (_, HealthResponse) = get_json(router, "/healthz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_readyz_follows_registry() {
        let (registry, router) = setup().await;
        let (status, readiness): (_, ReadinessResponse) =
            get_json(router.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!readiness.ready);

        registry.set_ready(true).await;
        let (status, readiness): (_, ReadinessResponse) = get_json(router, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert!(readiness.ready);
    }

    #[tokio::test]
    async fn test_metrics_exposes_detector_series() {
        DetectorMetrics::new().set_metric_value("api_test_metric", 1.5);
        let (_, router) = setup().await;

        let response = router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("selfheal_metric_value{metric=\"api_test_metric\"} 1.5"));
    }

    #[tokio::test]
    async fn test_action_route_only_when_enabled() {
        let body = serde_json::json!({
            "metric": "m", "value": 1.0, "action": "defer",
            "target": { "namespace": "selfheal" }
        })
        .to_string();
        let post = || {
            Request::builder()
                .method("POST")
                .uri("/action")
                .header("content-type", "application/json")
                .body(Body::from(body.clone()))
                .unwrap()
        };

        let (_, router) = setup().await;
        let response = router.oneshot(post()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let actuator = Arc::new(ActuatorState::new(Arc::new(NoopExecutor), 300));
        let router = create_router(Arc::new(AppState::new(HealthRegistry::new())), Some(actuator));
        let response = router.oneshot(post()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
