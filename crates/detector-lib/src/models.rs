//! Core data models for the detector

use serde::{Deserialize, Serialize};
use std::fmt;

/// A monitored metric: where to sample it, how to judge it, what to do about it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    #[serde(alias = "promql")]
    pub query: String,
    pub detection: Detection,
    pub action: ActionSpec,
}

impl MetricSpec {
    /// Identity of the remediation target this metric acts on
    pub fn target_key(&self) -> TargetKey {
        TargetKey::new(&self.action.kind, &self.action.target)
    }
}

fn default_consecutive() -> u32 {
    1
}

/// Detection method with its parameters, resolved when the config is loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Detection {
    #[serde(rename = "zscore")]
    ZScore {
        #[serde(alias = "z_threshold")]
        threshold: f64,
        #[serde(default = "default_consecutive")]
        consecutive: u32,
    },
    Slope {
        slope_threshold: f64,
    },
    EwmaZscore {
        z_threshold: f64,
        span_seconds: u64,
        #[serde(default = "default_consecutive")]
        consecutive: u32,
    },
    WindowThreshold {
        gt: f64,
        for_seconds: u64,
    },
}

impl Detection {
    /// Short method name used in logs and tables
    pub fn method(&self) -> &'static str {
        match self {
            Detection::ZScore { .. } => "zscore",
            Detection::Slope { .. } => "slope",
            Detection::EwmaZscore { .. } => "ewma_zscore",
            Detection::WindowThreshold { .. } => "window_threshold",
        }
    }

    /// Number of consecutive positive checks required before the metric counts as detected
    pub fn consecutive(&self) -> u32 {
        match self {
            Detection::ZScore { consecutive, .. } | Detection::EwmaZscore { consecutive, .. } => {
                (*consecutive).max(1)
            }
            _ => 1,
        }
    }
}

/// Remediation action vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    RestartPod,
    RolloutRestart,
    ScaleDeployment,
    ScaleUp,
    ScaleDown,
    HttpPost,
    Defer,
    /// Kept so a misspelled kind fails at dispatch instead of at startup
    Unknown(String),
}

impl ActionKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::RestartPod => "restart_pod",
            ActionKind::RolloutRestart => "rollout_restart",
            ActionKind::ScaleDeployment => "scale_deployment",
            ActionKind::ScaleUp => "scale_up",
            ActionKind::ScaleDown => "scale_down",
            ActionKind::HttpPost => "http_post",
            ActionKind::Defer => "defer",
            ActionKind::Unknown(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ActionKind::Unknown(_))
    }
}

impl From<String> for ActionKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "restart_pod" => ActionKind::RestartPod,
            "rollout_restart" => ActionKind::RolloutRestart,
            "scale_deployment" => ActionKind::ScaleDeployment,
            "scale_up" => ActionKind::ScaleUp,
            "scale_down" => ActionKind::ScaleDown,
            "http_post" => ActionKind::HttpPost,
            "defer" => ActionKind::Defer,
            _ => ActionKind::Unknown(value),
        }
    }
}

impl From<&str> for ActionKind {
    fn from(value: &str) -> Self {
        ActionKind::from(value.to_string())
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action attached to a metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(alias = "type")]
    pub kind: ActionKind,
    pub target: ActionTarget,
}

/// Workload the action is aimed at
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionTarget {
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Replica multiplier for scale_deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<u32>,
    /// Replica ceiling for scaling actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
    /// Replica step for scale_up / scale_down
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    /// Action the remote actuator should run for http_post
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate: Option<ActionKind>,
}

impl ActionTarget {
    /// Target name, else selector, else `NA`
    pub fn subject(&self) -> &str {
        self.name
            .as_deref()
            .or(self.selector.as_deref())
            .unwrap_or("NA")
    }
}

/// Identity used to scope cooldown and budget state to a remediation target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetKey {
    pub kind: ActionKind,
    pub namespace: String,
    pub subject: String,
}

impl TargetKey {
    pub fn new(kind: &ActionKind, target: &ActionTarget) -> Self {
        Self {
            kind: kind.clone(),
            namespace: target.namespace.clone(),
            subject: target.subject().to_string(),
        }
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.namespace, self.subject)
    }
}
