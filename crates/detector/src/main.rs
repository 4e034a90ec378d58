//! Self-healing detector
//!
//! Polls Prometheus for the configured metrics, detects anomalies and runs
//! gated remediation actions against Kubernetes workloads.

use anyhow::{Context, Result};
use detector_lib::{
    actuator::{ActionExecutor, RemediationExecutor},
    config::DetectorConfig,
    control::ControlLoopBuilder,
    health::{components, HealthRegistry},
    observability::{DetectorMetrics, StructuredLogger},
    source::{MetricSource, PrometheusSource},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod actuator;
mod api;
mod config;

const DETECTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting selfheal-detector");

    let agent = config::AgentConfig::load().context("failed to read process settings")?;
    let detector = DetectorConfig::load(&agent.config_path).with_context(|| {
        format!(
            "failed to load detector config from {}",
            agent.config_path.display()
        )
    })?;
    info!(
        instance = %agent.instance_name,
        config = %agent.config_path.display(),
        metrics = detector.metrics.len(),
        "Detector configured"
    );

    let health_registry =
        HealthRegistry::new().with_stale_after(detector.poll_interval() * 3);
    health_registry.register_all().await;

    // Register the metric families before the first scrape
    let _metrics = DetectorMetrics::new();

    let logger = StructuredLogger::new(&agent.instance_name);
    logger.log_startup(DETECTOR_VERSION, detector.metrics.len(), detector.dry_run);

    let source: Arc<dyn MetricSource> = Arc::new(
        PrometheusSource::new(
            &detector.prometheus.url,
            Duration::from_secs(detector.prometheus.timeout_seconds),
        )
        .context("invalid prometheus url")?,
    );
    let executor: Arc<dyn ActionExecutor> = Arc::new(
        RemediationExecutor::from_config(&detector)
            .await
            .context("failed to initialise action executor")?,
    );

    let actuator_state = detector.actuator_api.enabled.then(|| {
        info!(
            cooldown_secs = detector.actuator_api.cooldown_seconds,
            "Actuator service enabled"
        );
        Arc::new(actuator::ActuatorState::new(
            executor.clone(),
            detector.actuator_api.cooldown_seconds,
        ))
    });

    let control = ControlLoopBuilder::new()
        .config(&detector)
        .source(source)
        .executor(executor)
        .logger(logger.clone())
        .health(health_registry.clone())
        .build()?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    let router = api::create_router(app_state, actuator_state);
    let api_handle = tokio::spawn(api::serve(agent.api_port, router));

    let loop_health = health_registry.clone();
    let loop_handle = tokio::spawn({
        let shutdown = shutdown_tx.subscribe();
        async move {
            control.run(shutdown).await;
            loop_health
                .set_unhealthy(components::CONTROL_LOOP, "control loop stopped")
                .await;
        }
    });

    health_registry.set_ready(true).await;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
                Ok(Ok(())) => {}
            }
            logger.log_shutdown("API server stopped");
        }
    }

    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());
    if let Err(e) = loop_handle.await {
        error!(error = %e, "Control loop task panicked");
    }

    info!("Shutdown complete");
    Ok(())
}
