//! Remediation executors
//!
//! The control loop only sees [`ActionExecutor`]. [`RemediationExecutor`] maps
//! the action vocabulary onto a [`WorkloadOps`] backend (Kubernetes API or
//! kubectl) and an optional [`HttpForwarder`] for `http_post`.

mod http;
mod kube_api;
mod kubectl;
mod workload;

pub use http::{ActionRequest, ActionResponse, HttpForwarder, FORWARD_TIMEOUT};
pub use kube_api::KubeWorkloads;
pub use kubectl::{parse_replicas, KubectlWorkloads};
pub use workload::{
    scaled_by_factor, stepped_down, stepped_up, WorkloadOps, DEFAULT_MAX_REPLICAS,
    DEFAULT_SCALE_FACTOR, DEFAULT_SCALE_STEP, RESTARTED_AT_ANNOTATION,
};

use crate::config::{DetectorConfig, ExecutorBackend};
use crate::error::ExecutorError;
use crate::models::{ActionKind, ActionTarget};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// The detection that led to an action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trigger {
    pub metric: String,
    pub value: f64,
    /// Detector score at the time of firing, when the method produces one
    pub score: Option<f64>,
}

/// Result of one executor call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub ok: bool,
    pub message: String,
}

impl ActionOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Performs a remediation. Failures are reported in the outcome, never raised.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        kind: &ActionKind,
        target: &ActionTarget,
        trigger: &Trigger,
    ) -> ActionOutcome;
}

/// Executor backed by cluster workload operations
pub struct RemediationExecutor {
    workloads: Arc<dyn WorkloadOps>,
    forwarder: Option<HttpForwarder>,
    timeout: Duration,
    default_step: u32,
}

impl RemediationExecutor {
    pub fn new(workloads: Arc<dyn WorkloadOps>, timeout: Duration) -> Self {
        Self {
            workloads,
            forwarder: None,
            timeout,
            default_step: DEFAULT_SCALE_STEP,
        }
    }

    pub fn with_forwarder(mut self, forwarder: HttpForwarder) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn with_default_step(mut self, step: u32) -> Self {
        self.default_step = step;
        self
    }

    /// Build the configured backend, plus a forwarder when a remote endpoint is set
    pub async fn from_config(config: &DetectorConfig) -> Result<Self, ExecutorError> {
        let workloads: Arc<dyn WorkloadOps> = match config.executor.backend {
            ExecutorBackend::Kube => Arc::new(KubeWorkloads::try_default().await?),
            ExecutorBackend::Kubectl => {
                Arc::new(KubectlWorkloads::new(config.executor.kubectl_path.clone()))
            }
        };

        let mut executor = Self::new(
            workloads,
            Duration::from_secs(config.executor.timeout_seconds),
        )
        .with_default_step(config.actuator_api.scale_step);

        if let Some(endpoint) = &config.actuator.endpoint {
            let forwarder = HttpForwarder::new(endpoint, config.actuator.token.clone())?;
            executor = executor.with_forwarder(forwarder);
        }

        info!(
            backend = ?config.executor.backend,
            remote = config.actuator.endpoint.is_some(),
            "Action executor ready"
        );
        Ok(executor)
    }

    fn require_name<'a>(
        kind: &'static str,
        target: &'a ActionTarget,
    ) -> Result<&'a str, ExecutorError> {
        target
            .name
            .as_deref()
            .ok_or(ExecutorError::MissingField { kind, field: "name" })
    }

    async fn scale(
        &self,
        kind: &'static str,
        target: &ActionTarget,
        desired: impl FnOnce(u32) -> u32,
    ) -> Result<String, ExecutorError> {
        let name = Self::require_name(kind, target)?;
        let current = self.workloads.replicas(&target.namespace, name).await?;
        let next = desired(current);
        debug!(deployment = %name, current, next, "Computed replica count");
        if next == current {
            return Ok(format!("replicas unchanged at {current}"));
        }
        self.workloads
            .set_replicas(&target.namespace, name, next)
            .await
    }

    async fn run(
        &self,
        kind: &ActionKind,
        target: &ActionTarget,
        trigger: &Trigger,
    ) -> Result<String, ExecutorError> {
        match kind {
            ActionKind::RestartPod => match (&target.selector, &target.name) {
                (Some(selector), _) => {
                    self.workloads
                        .delete_pods(&target.namespace, selector)
                        .await
                }
                (None, Some(name)) => self.workloads.delete_pod(&target.namespace, name).await,
                (None, None) => Err(ExecutorError::MissingField {
                    kind: "restart_pod",
                    field: "selector",
                }),
            },
            ActionKind::RolloutRestart => {
                let name = Self::require_name("rollout_restart", target)?;
                self.workloads
                    .rollout_restart(&target.namespace, name, Utc::now())
                    .await
            }
            ActionKind::ScaleDeployment => {
                let factor = target.factor.unwrap_or(DEFAULT_SCALE_FACTOR);
                let max = target.max.unwrap_or(DEFAULT_MAX_REPLICAS);
                self.scale("scale_deployment", target, |cur| {
                    scaled_by_factor(cur, factor, max)
                })
                .await
            }
            ActionKind::ScaleUp => {
                let step = target.step.unwrap_or(self.default_step);
                self.scale("scale_up", target, |cur| stepped_up(cur, step, target.max))
                    .await
            }
            ActionKind::ScaleDown => {
                let step = target.step.unwrap_or(self.default_step);
                self.scale("scale_down", target, |cur| stepped_down(cur, step))
                    .await
            }
            ActionKind::HttpPost => {
                let forwarder = self.forwarder.as_ref().ok_or(ExecutorError::NoEndpoint)?;
                let request = ActionRequest {
                    metric: trigger.metric.clone(),
                    value: trigger.value,
                    zscore: trigger.score,
                    action: target.delegate.clone().unwrap_or(ActionKind::Defer),
                    target: ActionTarget {
                        delegate: None,
                        ..target.clone()
                    },
                };
                forwarder.forward(&request).await
            }
            ActionKind::Defer => Ok("deferred by policy".to_string()),
            ActionKind::Unknown(name) => Err(ExecutorError::UnknownAction(name.clone())),
        }
    }
}

#[async_trait]
impl ActionExecutor for RemediationExecutor {
    async fn execute(
        &self,
        kind: &ActionKind,
        target: &ActionTarget,
        trigger: &Trigger,
    ) -> ActionOutcome {
        let result = match tokio::time::timeout(self.timeout, self.run(kind, target, trigger)).await
        {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::Timeout(self.timeout.as_secs())),
        };

        match result {
            Ok(message) => ActionOutcome::success(message),
            Err(e) => ActionOutcome::failure(e.to_string()),
        }
    }
}
