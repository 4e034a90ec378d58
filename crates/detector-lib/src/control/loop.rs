//! Control loop driver

use super::{MetricOutcome, TickReport};
use crate::actuator::{ActionExecutor, Trigger};
use crate::config::DetectorConfig;
use crate::gate::GateChain;
use crate::health::{components, HealthRegistry};
use crate::models::MetricSpec;
use crate::observability::{DetectorMetrics, StructuredLogger};
use crate::source::MetricSource;
use crate::store::{SampleStore, DEFAULT_HISTORY_CAPACITY};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Owns all per-metric and gate state; ticks run strictly one after another
pub struct ControlLoop {
    source: Arc<dyn MetricSource>,
    executor: Arc<dyn ActionExecutor>,
    metrics: Vec<MetricSpec>,
    store: SampleStore,
    gates: GateChain,
    dry_run: bool,
    backfill_on_start: bool,
    poll_interval: Duration,
    telemetry: DetectorMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
}

impl ControlLoop {
    /// Run until a shutdown signal arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            metrics = self.metrics.len(),
            dry_run = self.dry_run,
            "Starting control loop"
        );

        if self.backfill_on_start {
            self.backfill(Utc::now()).await;
        }

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    debug!(
                        dispatched = report.dispatched(),
                        fetch_failures = report.fetch_failures(),
                        "Tick complete"
                    );
                }
                _ = shutdown.recv() => {
                    info!("Shutting down control loop");
                    break;
                }
            }
        }
    }

    /// Run one tick at the current wall-clock time
    pub async fn tick(&mut self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    /// Run one tick with an explicit clock
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> TickReport {
        let start = Instant::now();
        let mut outcomes = Vec::with_capacity(self.metrics.len());
        let mut last_fetch_error = None;
        let mut dispatch_failure = None;

        for index in 0..self.metrics.len() {
            let spec = self.metrics[index].clone();
            let outcome = self.process(&spec, now).await;

            match &outcome {
                MetricOutcome::FetchFailed(e) => last_fetch_error = Some(e.clone()),
                MetricOutcome::Dispatched(result) if !result.ok => {
                    dispatch_failure = Some(result.message.clone())
                }
                _ => {}
            }
            outcomes.push((spec.name, outcome));
        }

        let report = TickReport { at: now, outcomes };
        self.update_health(&report, last_fetch_error, dispatch_failure)
            .await;
        self.telemetry
            .observe_tick_duration(start.elapsed().as_secs_f64());
        report
    }

    async fn process(&mut self, spec: &MetricSpec, now: DateTime<Utc>) -> MetricOutcome {
        let value = match self.source.sample(&spec.query).await {
            Ok(value) => value,
            Err(e) => {
                warn!(metric = %spec.name, error = %e, "Metric fetch failed, skipping this tick");
                self.telemetry.inc_fetch_errors(&spec.name);
                return MetricOutcome::FetchFailed(e.to_string());
            }
        };

        self.telemetry.set_metric_value(&spec.name, value);
        let observation = self.store.observe(&spec.name, &spec.detection, value);
        let evaluation = observation.evaluation;

        if !evaluation.fired {
            return MetricOutcome::NotDetected {
                score: evaluation.score,
            };
        }
        if !observation.detected {
            let required = spec.detection.consecutive();
            debug!(
                metric = %spec.name,
                hits = observation.hits,
                required,
                "Detector fired, waiting for consecutive hits"
            );
            return MetricOutcome::Pending {
                hits: observation.hits,
                required,
            };
        }

        self.telemetry.inc_anomalies_detected(&spec.name);
        self.logger
            .log_anomaly(&spec.name, spec.detection.method(), value, evaluation.score);

        let key = spec.target_key();
        let target = key.to_string();
        if let Err(rejection) = self.gates.admit(&spec.name, &key, now) {
            self.telemetry.inc_gate_rejections(rejection.gate().as_str());
            self.logger.log_gate_rejected(&spec.name, &target, &rejection);
            return MetricOutcome::Rejected(rejection);
        }

        let action = spec.action.kind.as_str();
        if self.dry_run {
            self.logger.log_dry_run(&spec.name, action, &target);
            return MetricOutcome::DryRun;
        }

        self.telemetry.inc_actions_dispatched(action, &target);
        let trigger = Trigger {
            metric: spec.name.clone(),
            value,
            score: evaluation.score,
        };
        let result = self
            .executor
            .execute(&spec.action.kind, &spec.action.target, &trigger)
            .await;
        if !result.ok {
            self.telemetry.inc_action_failures(action);
        }
        self.logger
            .log_dispatched(&spec.name, action, &target, result.ok, &result.message);

        MetricOutcome::Dispatched(result)
    }

    async fn update_health(
        &self,
        report: &TickReport,
        fetch_error: Option<String>,
        dispatch_failure: Option<String>,
    ) {
        match fetch_error {
            Some(e) => {
                let message = format!(
                    "{} of {} queries failed: {}",
                    report.fetch_failures(),
                    report.outcomes.len(),
                    e
                );
                self.health
                    .set_degraded(components::METRIC_SOURCE, message)
                    .await
            }
            None => self.health.set_healthy(components::METRIC_SOURCE).await,
        }

        // Executor health only changes when something was dispatched
        if let Some(message) = dispatch_failure {
            self.health
                .set_degraded(components::EXECUTOR, message)
                .await;
        } else if report.dispatched() > 0 {
            self.health.set_healthy(components::EXECUTOR).await;
        }

        self.health.record_tick(report.at).await;
    }

    /// Pre-fill empty windows from the source's history. Failures are logged
    /// and leave the window empty.
    pub async fn backfill(&mut self, now: DateTime<Utc>) {
        let step = self.poll_interval;
        let span = step.saturating_mul(self.store.capacity() as u32);
        let start = match chrono::Duration::from_std(span) {
            Ok(span) => now - span,
            Err(_) => return,
        };

        for spec in &self.metrics {
            if self.store.window(&spec.name).is_some_and(|w| !w.is_empty()) {
                continue;
            }
            match self
                .source
                .sample_range(&spec.query, start, now, step)
                .await
            {
                Ok(points) => {
                    let count = points.len();
                    for (_, value) in points {
                        self.store.append(&spec.name, value);
                    }
                    info!(metric = %spec.name, samples = count, "Backfilled history");
                }
                Err(e) => {
                    warn!(metric = %spec.name, error = %e, "History backfill failed");
                }
            }
        }
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn gates(&self) -> &GateChain {
        &self.gates
    }

    pub fn metrics(&self) -> &[MetricSpec] {
        &self.metrics
    }
}

/// Builder for the control loop
pub struct ControlLoopBuilder {
    source: Option<Arc<dyn MetricSource>>,
    executor: Option<Arc<dyn ActionExecutor>>,
    metrics: Vec<MetricSpec>,
    gates: GateChain,
    history_capacity: usize,
    poll_interval: Duration,
    dry_run: bool,
    backfill_on_start: bool,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl ControlLoopBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            executor: None,
            metrics: Vec::new(),
            gates: GateChain::new(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            poll_interval: Duration::from_secs(15),
            dry_run: false,
            backfill_on_start: false,
            logger: None,
            health: None,
        }
    }

    /// Take metrics, gates, timing and dry-run from a validated config
    pub fn config(self, config: &DetectorConfig) -> Self {
        self.metrics(config.metrics.clone())
            .gates(GateChain::from_config(config))
            .history_capacity(config.history_capacity)
            .poll_interval(config.poll_interval())
            .dry_run(config.dry_run)
            .backfill_on_start(config.backfill_on_start)
    }

    pub fn source(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn metrics(mut self, metrics: Vec<MetricSpec>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn gates(mut self, gates: GateChain) -> Self {
        self.gates = gates;
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn backfill_on_start(mut self, enabled: bool) -> Self {
        self.backfill_on_start = enabled;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> Result<ControlLoop> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Metric source is required"))?;
        let executor = self
            .executor
            .ok_or_else(|| anyhow::anyhow!("Action executor is required"))?;
        if self.poll_interval.is_zero() {
            anyhow::bail!("Poll interval must be positive");
        }

        Ok(ControlLoop {
            source,
            executor,
            metrics: self.metrics,
            store: SampleStore::new(self.history_capacity, self.poll_interval.as_secs().max(1)),
            gates: self.gates,
            dry_run: self.dry_run,
            backfill_on_start: self.backfill_on_start,
            poll_interval: self.poll_interval,
            telemetry: DetectorMetrics::new(),
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("selfheal-detector")),
            health: self.health.unwrap_or_default(),
        })
    }
}

impl Default for ControlLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
