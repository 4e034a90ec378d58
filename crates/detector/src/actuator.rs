//! Actuator service: executes actions forwarded by `http_post`

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::Utc;
use detector_lib::{
    actuator::{ActionExecutor, ActionRequest, ActionResponse, Trigger},
    gate::CooldownTable,
    models::{ActionKind, TargetKey},
    observability::DetectorMetrics,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct ActuatorState {
    executor: Arc<dyn ActionExecutor>,
    cooldown: Mutex<CooldownTable>,
    metrics: DetectorMetrics,
}

impl ActuatorState {
    pub fn new(executor: Arc<dyn ActionExecutor>, cooldown_seconds: u64) -> Self {
        Self {
            executor,
            cooldown: Mutex::new(CooldownTable::new(cooldown_seconds)),
            metrics: DetectorMetrics::new(),
        }
    }
}

fn reply(
    state: &ActuatorState,
    action: &ActionKind,
    status: StatusCode,
    ok: bool,
    message: String,
) -> (StatusCode, Json<ActionResponse>) {
    state
        .metrics
        .inc_actuator_requests(action.as_str(), status.as_u16());
    (status, Json(ActionResponse { ok, message }))
}

async fn handle_action(
    State(state): State<Arc<ActuatorState>>,
    Json(request): Json<ActionRequest>,
) -> (StatusCode, Json<ActionResponse>) {
    let action = request.action.clone();
    if matches!(action, ActionKind::HttpPost | ActionKind::Unknown(_)) {
        warn!(action = %action, metric = %request.metric, "Rejecting unsupported action");
        return reply(
            &state,
            &action,
            StatusCode::BAD_REQUEST,
            false,
            format!("unsupported action {action}"),
        );
    }

    let key = TargetKey::new(&action, &request.target);
    let now = Utc::now();
    // Hold the lock only for check-then-stamp; execution runs unlocked
    let admitted = state.cooldown.lock().await.allow(&key, now);
    if let Err(rejection) = admitted {
        info!(target_key = %key, reason = %rejection, "Actuator cooldown active");
        return reply(
            &state,
            &action,
            StatusCode::TOO_MANY_REQUESTS,
            false,
            rejection.to_string(),
        );
    }

    let trigger = Trigger {
        metric: request.metric.clone(),
        value: request.value,
        score: request.zscore,
    };
    let outcome = state
        .executor
        .execute(&action, &request.target, &trigger)
        .await;
    state.metrics.set_actuator_last_action(now.timestamp());

    info!(
        action = %action,
        target_key = %key,
        metric = %request.metric,
        ok = outcome.ok,
        message = %outcome.message,
        "Actuator executed action"
    );

    let status = if outcome.ok {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    reply(&state, &action, status, outcome.ok, outcome.message)
}

pub fn router(state: Arc<ActuatorState>) -> Router {
    Router::new()
        .route("/action", post(handle_action))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use detector_lib::actuator::ActionOutcome;
    use detector_lib::models::ActionTarget;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct CountingExecutor {
        calls: AtomicUsize,
        ok: bool,
    }

    #[async_trait]
    impl ActionExecutor for CountingExecutor {
        async fn execute(
            &self,
            kind: &ActionKind,
            _target: &ActionTarget,
            _trigger: &Trigger,
        ) -> ActionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.ok {
                ActionOutcome::success(format!("{kind} done"))
            } else {
                ActionOutcome::failure("deployments.apps \"api\" not found")
            }
        }
    }

    fn app(ok: bool) -> (Router, Arc<CountingExecutor>) {
        let executor = Arc::new(CountingExecutor {
            calls: AtomicUsize::new(0),
            ok,
        });
        let state = Arc::new(ActuatorState::new(executor.clone(), 300));
        (router(state), executor)
    }

    fn request(action: &str, name: &str) -> Request<Body> {
        let body = serde_json::json!({
            "metric": "error_rate",
            "value": 0.8,
            "zscore": 4.1,
            "action": action,
            "target": { "namespace": "selfheal", "name": name }
        });
        Request::builder()
            .method("POST")
            .uri("/action")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> ActionResponse {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_executes_and_then_enforces_cooldown() {
        let (app, executor) = app(true);

        let response = app
            .clone()
            .oneshot(request("rollout_restart", "api"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body.ok);
        assert_eq!(body.message, "rollout_restart done");

        let response = app
            .clone()
            .oneshot(request("rollout_restart", "api"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        // a different target has its own cooldown
        let response = app
            .oneshot(request("rollout_restart", "worker"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_and_http_post_rejected() {
        let (app, executor) = app(true);

        let response = app
            .clone()
            .oneshot(request("reboot_node", "api"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await.message, "unsupported action reboot_node");

        let response = app.oneshot(request("http_post", "api")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_executor_failure_is_bad_gateway() {
        let (app, _) = app(false);
        let before = DetectorMetrics::new().actuator_requests("scale_down", 502);

        let response = app.oneshot(request("scale_down", "api")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(!body_json(response).await.ok);
        assert_eq!(
            DetectorMetrics::new().actuator_requests("scale_down", 502),
            before + 1
        );
    }

    #[tokio::test]
    async fn test_malformed_body_rejected() {
        let (app, _) = app(true);
        let request = Request::builder()
            .method("POST")
            .uri("/action")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"metric":"x"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert!(response.status().is_client_error());
    }
}
