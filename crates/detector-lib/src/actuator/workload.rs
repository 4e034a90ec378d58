//! Workload operations used by cluster actions, and the replica arithmetic
//! that sits on top of them

use crate::error::ExecutorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Annotation patched onto the pod template to force a rollout
pub const RESTARTED_AT_ANNOTATION: &str = "selfheal/restartedAt";

/// Default multiplier for scale_deployment
pub const DEFAULT_SCALE_FACTOR: u32 = 2;

/// Default ceiling for scale_deployment
pub const DEFAULT_MAX_REPLICAS: u32 = 10;

/// Default step for scale_up / scale_down
pub const DEFAULT_SCALE_STEP: u32 = 2;

/// Operations a cluster backend must provide
#[async_trait]
pub trait WorkloadOps: Send + Sync {
    /// Current desired replica count of a deployment
    async fn replicas(&self, namespace: &str, name: &str) -> Result<u32, ExecutorError>;

    async fn set_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> Result<String, ExecutorError>;

    /// Delete every pod matching a label selector, without grace period
    async fn delete_pods(&self, namespace: &str, selector: &str) -> Result<String, ExecutorError>;

    /// Delete a single pod by name, without grace period
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<String, ExecutorError>;

    /// Trigger a rolling restart of a deployment
    async fn rollout_restart(
        &self,
        namespace: &str,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<String, ExecutorError>;
}

/// `min(current * factor, max)`; a deployment already above `max` is brought
/// back down to it
pub fn scaled_by_factor(current: u32, factor: u32, max: u32) -> u32 {
    current.saturating_mul(factor).min(max)
}

/// `current + step` bounded by an optional ceiling, never below the current
/// count and never below one replica
pub fn stepped_up(current: u32, step: u32, max: Option<u32>) -> u32 {
    let desired = current.saturating_add(step);
    let desired = max.map_or(desired, |m| desired.min(m));
    desired.max(current).max(1)
}

/// `current - step` with a floor of one replica, never above the current count
pub fn stepped_down(current: u32, step: u32) -> u32 {
    current.saturating_sub(step).max(1).min(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_by_factor() {
        assert_eq!(scaled_by_factor(2, 2, 10), 4);
        assert_eq!(scaled_by_factor(6, 2, 10), 10);
        assert_eq!(scaled_by_factor(10, 2, 10), 10);
        assert_eq!(scaled_by_factor(12, 2, 10), 10);
    }

    #[test]
    fn test_stepped_up() {
        assert_eq!(stepped_up(1, 2, None), 3);
        assert_eq!(stepped_up(4, 2, Some(5)), 5);
        assert_eq!(stepped_up(5, 2, Some(5)), 5);
        assert_eq!(stepped_up(0, 0, None), 1);
    }

    #[test]
    fn test_stepped_down_floor() {
        assert_eq!(stepped_down(5, 2), 3);
        assert_eq!(stepped_down(2, 2), 1);
        assert_eq!(stepped_down(1, 2), 1);
        assert_eq!(stepped_down(0, 2), 0);
    }
}
