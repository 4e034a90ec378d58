//! Detector configuration
//!
//! Loaded from a YAML/TOML/JSON file with `SELFHEAL__`-prefixed environment
//! overrides, then validated once. Detection methods and action kinds are
//! resolved to enums at this point so the control loop never compares strings.

use crate::error::{ConfigError, ConfigResult};
use crate::gate::InhibitRule;
use crate::models::{ActionKind, Detection, MetricSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Upper bound for any configured interval or window, in seconds (30 days)
pub const MAX_WINDOW_SECONDS: u64 = 30 * 24 * 3600;

/// Root detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,

    /// Log intended actions instead of executing them
    #[serde(default)]
    pub dry_run: bool,

    /// Samples kept per metric
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Pre-fill each metric's history from a range query at startup
    #[serde(default)]
    pub backfill_on_start: bool,

    #[serde(default)]
    pub budgets: BudgetConfig,

    #[serde(default)]
    pub inhibit: Vec<InhibitRule>,

    pub metrics: Vec<MetricSpec>,

    /// Remote actuator used by `http_post`
    #[serde(default)]
    pub actuator: RemoteActuatorConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Built-in actuator HTTP service
    #[serde(default)]
    pub actuator_api: ActuatorApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default = "default_prometheus_url")]
    pub url: String,
    #[serde(default = "default_prometheus_timeout")]
    pub timeout_seconds: u64,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: default_prometheus_url(),
            timeout_seconds: default_prometheus_timeout(),
        }
    }
}

/// Hourly action budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_budget", alias = "global_actions_per_hour")]
    pub global_per_hour: usize,
    #[serde(default = "default_budget")]
    pub per_target_per_hour: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            global_per_hour: default_budget(),
            per_target_per_hour: default_budget(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteActuatorConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// How cluster actions reach the workload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorBackend {
    #[default]
    Kube,
    Kubectl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub backend: ExecutorBackend,
    #[serde(default = "default_kubectl_path")]
    pub kubectl_path: String,
    #[serde(default = "default_executor_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            backend: ExecutorBackend::default(),
            kubectl_path: default_kubectl_path(),
            timeout_seconds: default_executor_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorApiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_actuator_cooldown")]
    pub cooldown_seconds: u64,
    #[serde(default = "default_scale_step")]
    pub scale_step: u32,
}

impl Default for ActuatorApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cooldown_seconds: default_actuator_cooldown(),
            scale_step: default_scale_step(),
        }
    }
}

fn default_prometheus_url() -> String {
    "http://prometheus:9090".to_string()
}

fn default_prometheus_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    15
}

fn default_cooldown() -> u64 {
    300
}

fn default_history_capacity() -> usize {
    120
}

fn default_budget() -> usize {
    9999
}

fn default_kubectl_path() -> String {
    "kubectl".to_string()
}

fn default_executor_timeout() -> u64 {
    15
}

fn default_actuator_cooldown() -> u64 {
    300
}

fn default_scale_step() -> u32 {
    2
}

impl DetectorConfig {
    /// Load configuration from a file plus environment overrides
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("SELFHEAL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: DetectorConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from an in-memory YAML document
    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Yaml))
            .build()?;

        let config: DetectorConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Reject configurations the control loop cannot run safely
    pub fn validate(&self) -> ConfigResult<()> {
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_seconds must be positive".to_string(),
            ));
        }
        let windows = [
            ("poll_interval_seconds", self.poll_interval_seconds),
            ("cooldown_seconds", self.cooldown_seconds),
            ("actuator_api.cooldown_seconds", self.actuator_api.cooldown_seconds),
        ];
        for (field, secs) in windows {
            if secs > MAX_WINDOW_SECONDS {
                return Err(ConfigError::Invalid(format!(
                    "{} must be at most {}",
                    field, MAX_WINDOW_SECONDS
                )));
            }
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity must be positive".to_string(),
            ));
        }
        if self.metrics.is_empty() {
            return Err(ConfigError::Invalid("no metrics configured".to_string()));
        }

        let mut names = HashSet::new();
        for metric in &self.metrics {
            if !names.insert(metric.name.as_str()) {
                return Err(ConfigError::DuplicateMetric(metric.name.clone()));
            }
            self.validate_metric(metric)?;
        }

        for rule in &self.inhibit {
            if !names.contains(rule.when_metric.as_str()) {
                return Err(ConfigError::UnknownInhibitSource(rule.when_metric.clone()));
            }
            if rule.suppress_actions_for_seconds > MAX_WINDOW_SECONDS {
                return Err(ConfigError::Invalid(format!(
                    "inhibit rule for {}: suppress_actions_for_seconds must be at most {}",
                    rule.when_metric, MAX_WINDOW_SECONDS
                )));
            }
            if let Some(unknown) = rule.metrics.iter().find(|m| !names.contains(m.as_str())) {
                return Err(ConfigError::UnknownInhibitSource(unknown.clone()));
            }
        }

        Ok(())
    }

    fn validate_metric(&self, metric: &MetricSpec) -> ConfigResult<()> {
        let invalid = |msg: &str| ConfigError::Invalid(format!("metric {}: {}", metric.name, msg));

        match &metric.detection {
            Detection::ZScore { threshold, .. } if !threshold.is_finite() => {
                return Err(invalid("zscore threshold must be finite"));
            }
            Detection::EwmaZscore { span_seconds, .. } if *span_seconds == 0 => {
                return Err(invalid("ewma_zscore span_seconds must be positive"));
            }
            _ => {}
        }

        let target = &metric.action.target;
        match &metric.action.kind {
            ActionKind::ScaleDeployment if target.factor == Some(0) => {
                return Err(invalid("scale_deployment factor must be at least 1"));
            }
            ActionKind::HttpPost if self.actuator.endpoint.is_none() => {
                return Err(invalid("http_post requires actuator.endpoint"));
            }
            ActionKind::Unknown(kind) => {
                warn!(
                    metric = %metric.name,
                    action = %kind,
                    "Unknown action kind, dispatch will be reported as failed"
                );
            }
            _ => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
prometheus:
  url: http://prometheus.monitoring:9090
poll_interval_seconds: 10
cooldown_seconds: 120
dry_run: true
budgets:
  global_actions_per_hour: 6
  per_target_per_hour: 2
inhibit:
  - when_metric: error_rate
    suppress_actions_for_seconds: 300
metrics:
  - name: cpu_p99
    promql: sum(rate(container_cpu_usage_seconds_total{namespace="selfheal"}[1m]))
    detection:
      method: zscore
      threshold: 3
    action:
      type: scale_deployment
      target:
        namespace: selfheal
        name: selfheal-api
        factor: 2
        max: 6
  - name: error_rate
    query: sum(rate(http_requests_total{code=~"5.."}[1m]))
    detection:
      method: window_threshold
      gt: 0.5
      for_seconds: 60
    action:
      kind: rollout_restart
      target:
        namespace: selfheal
        name: selfheal-api
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = DetectorConfig::from_yaml(SAMPLE).unwrap();

        assert_eq!(config.poll_interval_seconds, 10);
        assert_eq!(config.cooldown_seconds, 120);
        assert!(config.dry_run);
        assert_eq!(config.budgets.global_per_hour, 6);
        assert_eq!(config.budgets.per_target_per_hour, 2);
        assert_eq!(config.history_capacity, 120);
        assert_eq!(config.metrics.len(), 2);
        assert_eq!(
            config.metrics[0].detection,
            Detection::ZScore {
                threshold: 3.0,
                consecutive: 1
            }
        );
        assert_eq!(config.metrics[1].action.kind, ActionKind::RolloutRestart);
        assert_eq!(config.inhibit[0].when_metric, "error_rate");
        assert_eq!(config.executor.backend, ExecutorBackend::Kube);
    }

    #[test]
    fn test_defaults_applied() {
        let config = DetectorConfig::from_yaml(
            r#"
metrics:
  - name: mem
    query: sum(container_memory_working_set_bytes)
    detection: {method: slope, slope_threshold: 1000}
    action: {kind: defer, target: {namespace: default}}
"#,
        )
        .unwrap();

        assert_eq!(config.poll_interval_seconds, 15);
        assert_eq!(config.cooldown_seconds, 300);
        assert!(!config.dry_run);
        assert_eq!(config.budgets.global_per_hour, 9999);
        assert_eq!(config.prometheus.timeout_seconds, 10);
        assert!(!config.actuator_api.enabled);
        assert_eq!(config.actuator_api.scale_step, 2);
    }

    #[test]
    fn test_duplicate_metric_rejected() {
        let result = DetectorConfig::from_yaml(
            r#"
metrics:
  - name: mem
    query: a
    detection: {method: slope, slope_threshold: 1}
    action: {kind: defer, target: {namespace: default}}
  - name: mem
    query: b
    detection: {method: slope, slope_threshold: 1}
    action: {kind: defer, target: {namespace: default}}
"#,
        );
        assert!(matches!(result, Err(ConfigError::DuplicateMetric(name)) if name == "mem"));
    }

    #[test]
    fn test_unknown_inhibit_source_rejected() {
        let result = DetectorConfig::from_yaml(
            r#"
inhibit:
  - when_metric: ghost
    suppress_actions_for_seconds: 60
metrics:
  - name: mem
    query: a
    detection: {method: slope, slope_threshold: 1}
    action: {kind: defer, target: {namespace: default}}
"#,
        );
        assert!(matches!(result, Err(ConfigError::UnknownInhibitSource(name)) if name == "ghost"));
    }

    #[test]
    fn test_oversized_windows_rejected() {
        let metric = r#"
metrics:
  - name: error_rate
    query: a
    detection: {method: slope, slope_threshold: 1}
    action: {kind: defer, target: {namespace: default}}
"#;
        let cases = [
            "cooldown_seconds: 10000000000000",
            "actuator_api: {cooldown_seconds: 10000000000000}",
            "poll_interval_seconds: 2592001",
            "inhibit: [{when_metric: error_rate, suppress_actions_for_seconds: 10000000000000}]",
        ];
        for case in cases {
            let result = DetectorConfig::from_yaml(&format!("{}{}", case, metric));
            assert!(
                matches!(result, Err(ConfigError::Invalid(_))),
                "accepted {}",
                case
            );
        }

        let at_limit = format!("cooldown_seconds: {}{}", MAX_WINDOW_SECONDS, metric);
        assert!(DetectorConfig::from_yaml(&at_limit).is_ok());
    }

    #[test]
    fn test_http_post_requires_endpoint() {
        let result = DetectorConfig::from_yaml(
            r#"
metrics:
  - name: mem
    query: a
    detection: {method: slope, slope_threshold: 1}
    action: {kind: http_post, target: {namespace: default}}
"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_action_kind_is_not_fatal() {
        let config = DetectorConfig::from_yaml(
            r#"
metrics:
  - name: mem
    query: a
    detection: {method: slope, slope_threshold: 1}
    action: {kind: reboot_node, target: {namespace: default}}
"#,
        )
        .unwrap();
        assert!(!config.metrics[0].action.kind.is_known());
    }

    #[test]
    fn test_missing_method_parameter_fails_at_load() {
        let result = DetectorConfig::from_yaml(
            r#"
metrics:
  - name: mem
    query: a
    detection: {method: ewma_zscore, z_threshold: 3}
    action: {kind: defer, target: {namespace: default}}
"#,
        );
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = DetectorConfig::load(file.path()).unwrap();
        assert_eq!(config.metrics.len(), 2);
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
    }
}
