//! Observability for the detector
//!
//! Provides:
//! - Prometheus metrics for detections, gate outcomes, dispatches and ticks
//! - Structured JSON logging with tracing

use crate::gate::GateRejection;
use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter_vec, Gauge,
    GaugeVec, Histogram, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn, Level};

/// Tick duration buckets in seconds; a tick includes network calls
const TICK_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

static GLOBAL_METRICS: OnceLock<DetectorMetricsInner> = OnceLock::new();

struct DetectorMetricsInner {
    anomalies_detected: IntCounterVec,
    actions_dispatched: IntCounterVec,
    metric_value: GaugeVec,
    gate_rejections: IntCounterVec,
    fetch_errors: IntCounterVec,
    action_failures: IntCounterVec,
    tick_duration_seconds: Histogram,
    actuator_requests: IntCounterVec,
    actuator_last_action: Gauge,
}

impl DetectorMetricsInner {
    fn new() -> Self {
        Self {
            anomalies_detected: register_int_counter_vec!(
                "selfheal_anomalies_detected_total",
                "Detections that reached the gate chain",
                &["metric"]
            )
            .expect("Failed to register anomalies_detected"),

            actions_dispatched: register_int_counter_vec!(
                "selfheal_actions_dispatched_total",
                "Executor calls made, counted at call time",
                &["action", "target"]
            )
            .expect("Failed to register actions_dispatched"),

            metric_value: register_gauge_vec!(
                "selfheal_metric_value",
                "Last sampled value per monitored metric",
                &["metric"]
            )
            .expect("Failed to register metric_value"),

            gate_rejections: register_int_counter_vec!(
                "selfheal_gate_rejections_total",
                "Detections rejected by a gate",
                &["gate"]
            )
            .expect("Failed to register gate_rejections"),

            fetch_errors: register_int_counter_vec!(
                "selfheal_fetch_errors_total",
                "Failed metric source queries",
                &["metric"]
            )
            .expect("Failed to register fetch_errors"),

            action_failures: register_int_counter_vec!(
                "selfheal_action_failures_total",
                "Executor calls that reported failure",
                &["action"]
            )
            .expect("Failed to register action_failures"),

            tick_duration_seconds: register_histogram!(
                "selfheal_tick_duration_seconds",
                "Wall time of one control loop tick",
                TICK_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_duration_seconds"),

            actuator_requests: register_int_counter_vec!(
                "selfheal_actuator_requests_total",
                "Requests handled by the actuator service",
                &["action", "status"]
            )
            .expect("Failed to register actuator_requests"),

            actuator_last_action: register_gauge!(
                "selfheal_actuator_last_action_timestamp_seconds",
                "Unix time of the last action executed by the actuator service"
            )
            .expect("Failed to register actuator_last_action"),
        }
    }
}

/// Handle to the process-wide detector metrics. Clones share one registry entry.
#[derive(Clone)]
pub struct DetectorMetrics {
    _private: (),
}

impl Default for DetectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DetectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DetectorMetricsInner {
        GLOBAL_METRICS.get_or_init(DetectorMetricsInner::new)
    }

    pub fn set_metric_value(&self, metric: &str, value: f64) {
        self.inner()
            .metric_value
            .with_label_values(&[metric])
            .set(value);
    }

    pub fn inc_anomalies_detected(&self, metric: &str) {
        self.inner()
            .anomalies_detected
            .with_label_values(&[metric])
            .inc();
    }

    pub fn inc_gate_rejections(&self, gate: &str) {
        self.inner()
            .gate_rejections
            .with_label_values(&[gate])
            .inc();
    }

    pub fn inc_actions_dispatched(&self, action: &str, target: &str) {
        self.inner()
            .actions_dispatched
            .with_label_values(&[action, target])
            .inc();
    }

    pub fn inc_action_failures(&self, action: &str) {
        self.inner()
            .action_failures
            .with_label_values(&[action])
            .inc();
    }

    pub fn inc_fetch_errors(&self, metric: &str) {
        self.inner().fetch_errors.with_label_values(&[metric]).inc();
    }

    pub fn observe_tick_duration(&self, duration_secs: f64) {
        self.inner().tick_duration_seconds.observe(duration_secs);
    }

    pub fn inc_actuator_requests(&self, action: &str, status: u16) {
        self.inner()
            .actuator_requests
            .with_label_values(&[action, &status.to_string()])
            .inc();
    }

    pub fn set_actuator_last_action(&self, unix_secs: i64) {
        self.inner().actuator_last_action.set(unix_secs as f64);
    }

    pub fn anomalies_detected(&self, metric: &str) -> u64 {
        self.inner()
            .anomalies_detected
            .with_label_values(&[metric])
            .get()
    }

    pub fn actions_dispatched(&self, action: &str, target: &str) -> u64 {
        self.inner()
            .actions_dispatched
            .with_label_values(&[action, target])
            .get()
    }

    pub fn action_failures(&self, action: &str) -> u64 {
        self.inner()
            .action_failures
            .with_label_values(&[action])
            .get()
    }

    pub fn fetch_errors(&self, metric: &str) -> u64 {
        self.inner().fetch_errors.with_label_values(&[metric]).get()
    }

    pub fn actuator_requests(&self, action: &str, status: u16) -> u64 {
        self.inner()
            .actuator_requests
            .with_label_values(&[action, &status.to_string()])
            .get()
    }
}

/// Named detector events with a consistent field set
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn log_startup(&self, version: &str, metrics: usize, dry_run: bool) {
        info!(
            event = "detector_started",
            instance = %self.instance,
            version = %version,
            metrics = metrics,
            dry_run = dry_run,
            "Self-healing detector started"
        );
    }

    pub fn log_anomaly(&self, metric: &str, method: &str, value: f64, score: Option<f64>) {
        warn!(
            event = "anomaly_detected",
            instance = %self.instance,
            metric = %metric,
            method = %method,
            value = value,
            score = ?score,
            "Anomaly detected"
        );
    }

    /// Cooldown rejections log at info, inhibition and budget rejections at warn
    pub fn log_gate_rejected(&self, metric: &str, target: &str, rejection: &GateRejection) {
        let gate = rejection.gate();
        if gate.log_level() == Level::INFO {
            info!(
                event = "gate_rejected",
                instance = %self.instance,
                metric = %metric,
                target_key = %target,
                gate = gate.as_str(),
                reason = %rejection,
                "Action held by cooldown"
            );
        } else {
            warn!(
                event = "gate_rejected",
                instance = %self.instance,
                metric = %metric,
                target_key = %target,
                gate = gate.as_str(),
                reason = %rejection,
                "Action rejected by gate"
            );
        }
    }

    pub fn log_dispatched(
        &self,
        metric: &str,
        action: &str,
        target: &str,
        ok: bool,
        message: &str,
    ) {
        if ok {
            info!(
                event = "action_dispatched",
                instance = %self.instance,
                metric = %metric,
                action = %action,
                target_key = %target,
                ok = true,
                message = %message,
                "Remediation action succeeded"
            );
        } else {
            warn!(
                event = "action_dispatched",
                instance = %self.instance,
                metric = %metric,
                action = %action,
                target_key = %target,
                ok = false,
                message = %message,
                "Remediation action failed"
            );
        }
    }

    pub fn log_dry_run(&self, metric: &str, action: &str, target: &str) {
        info!(
            event = "action_dry_run",
            instance = %self.instance,
            metric = %metric,
            action = %action,
            target_key = %target,
            "Dry run, action not executed"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "detector_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Self-healing detector shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_metrics_count() {
        let metrics = DetectorMetrics::new();
        let before = metrics.actions_dispatched("scale_up", "scale_up:obs-test:api");

        metrics.inc_actions_dispatched("scale_up", "scale_up:obs-test:api");
        metrics.inc_actions_dispatched("scale_up", "scale_up:obs-test:api");
        metrics.set_metric_value("obs_test_metric", 0.5);
        metrics.observe_tick_duration(0.02);

        assert_eq!(
            metrics.actions_dispatched("scale_up", "scale_up:obs-test:api"),
            before + 2
        );
    }

    #[test]
    fn test_clones_share_counters() {
        let a = DetectorMetrics::new();
        let b = a.clone();
        let before = a.fetch_errors("obs_clone_metric");
        b.inc_fetch_errors("obs_clone_metric");
        assert_eq!(a.fetch_errors("obs_clone_metric"), before + 1);
    }

    #[test]
    fn test_metrics_are_gathered() {
        let metrics = DetectorMetrics::new();
        metrics.inc_gate_rejections("cooldown");
        let names: Vec<String> = prometheus::gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"selfheal_gate_rejections_total".to_string()));
    }

    #[test]
    fn test_structured_logger_instance() {
        let logger = StructuredLogger::new("detector-0");
        assert_eq!(logger.instance(), "detector-0");
    }
}
