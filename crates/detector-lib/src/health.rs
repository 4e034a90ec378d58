//! Liveness and readiness for the detector process
//!
//! Three components are tracked: the metric source, the action executor and
//! the control loop itself. The loop also stamps every completed tick so
//! readiness can tell a stalled loop from an idle one.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Operating, but the last call failed
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn at(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::at(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::at(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::at(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Body of `GET /healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tick_timestamp: Option<i64>,
}

impl HealthResponse {
    /// Worst status wins
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|c| c.status)
            .fold(ComponentStatus::Healthy, |worst, s| match (worst, s) {
                (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                    ComponentStatus::Unhealthy
                }
                (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                    ComponentStatus::Degraded
                }
                _ => ComponentStatus::Healthy,
            })
    }
}

/// Body of `GET /readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub mod components {
    pub const METRIC_SOURCE: &str = "metric_source";
    pub const EXECUTOR: &str = "executor";
    pub const CONTROL_LOOP: &str = "control_loop";

    pub const ALL: [&str; 3] = [METRIC_SOURCE, EXECUTOR, CONTROL_LOOP];
}

/// Shared health state; clones observe the same registry
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
    last_tick: Arc<RwLock<Option<DateTime<Utc>>>>,
    stale_after: Option<Duration>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
            last_tick: Arc::new(RwLock::new(None)),
            stale_after: None,
        }
    }

    /// Report not-ready once no tick has completed for this long
    pub fn with_stale_after(mut self, after: std::time::Duration) -> Self {
        self.stale_after = Duration::from_std(after).ok();
        self
    }

    /// Register every detector component as healthy
    pub async fn register_all(&self) {
        let mut map = self.components.write().await;
        for name in components::ALL {
            map.insert(name.to_string(), ComponentHealth::healthy());
        }
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn record_tick(&self, at: DateTime<Utc>) {
        *self.last_tick.write().await = Some(at);
    }

    pub async fn last_tick(&self) -> Option<DateTime<Utc>> {
        *self.last_tick.read().await
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse {
            status,
            components,
            last_tick_timestamp: self.last_tick().await.map(|t| t.timestamp()),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        self.readiness_at(Utc::now()).await
    }

    pub async fn readiness_at(&self, now: DateTime<Utc>) -> ReadinessResponse {
        let not_ready = |reason: &str| ReadinessResponse {
            ready: false,
            reason: Some(reason.to_string()),
        };

        if !*self.ready.read().await {
            return not_ready("detector not yet initialized");
        }
        if self.health().await.status == ComponentStatus::Unhealthy {
            return not_ready("critical component unhealthy");
        }
        if let (Some(limit), Some(last)) = (self.stale_after, self.last_tick().await) {
            if now - last > limit {
                return not_ready("control loop stalled");
            }
        }

        ReadinessResponse {
            ready: true,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_register_all_components_healthy() {
        let registry = HealthRegistry::new();
        registry.register_all().await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        for name in components::ALL {
            assert_eq!(health.components[name].status, ComponentStatus::Healthy);
        }
        assert!(health.last_tick_timestamp.is_none());
    }

    #[tokio::test]
    async fn test_degraded_executor_degrades_overall() {
        let registry = HealthRegistry::new();
        registry.register_all().await;
        registry
            .set_degraded(components::EXECUTOR, "unknown action reboot_node")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::EXECUTOR].message.as_deref(),
            Some("unknown action reboot_node")
        );
    }

    #[tokio::test]
    async fn test_unhealthy_wins_over_degraded() {
        let registry = HealthRegistry::new();
        registry.register_all().await;
        registry.set_degraded(components::EXECUTOR, "slow").await;
        registry
            .set_unhealthy(components::METRIC_SOURCE, "unreachable")
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
        registry.set_ready(true).await;
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_not_ready_until_initialized() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);

        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_stalled_loop_not_ready() {
        let registry = HealthRegistry::new().with_stale_after(std::time::Duration::from_secs(45));
        registry.set_ready(true).await;

        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        registry.record_tick(t0).await;

        assert!(registry.readiness_at(t0 + Duration::seconds(30)).await.ready);
        let stalled = registry.readiness_at(t0 + Duration::seconds(46)).await;
        assert!(!stalled.ready);
        assert_eq!(stalled.reason.as_deref(), Some("control loop stalled"));
        assert_eq!(
            registry.health().await.last_tick_timestamp,
            Some(1_700_000_000)
        );
    }
}
