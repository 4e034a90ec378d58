//! Self-healing detector library
//!
//! This crate provides the core functionality for:
//! - Sampling metrics from Prometheus
//! - Statistical anomaly detection over per-metric history
//! - Gating detections through inhibition, cooldown and hourly budgets
//! - Dispatching remediation actions to Kubernetes or a remote actuator
//! - Health checks and observability

pub mod actuator;
pub mod anomaly;
pub mod config;
pub mod control;
pub mod error;
pub mod gate;
pub mod health;
pub mod models;
pub mod observability;
pub mod source;
pub mod store;

pub use actuator::{ActionExecutor, ActionOutcome, RemediationExecutor, Trigger};
pub use config::DetectorConfig;
pub use control::{ControlLoop, ControlLoopBuilder, MetricOutcome, TickReport};
pub use error::{ConfigError, ExecutorError, FetchError};
pub use gate::{GateChain, GateRejection};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{DetectorMetrics, StructuredLogger};
pub use source::{MetricSource, PrometheusSource};
pub use store::SampleStore;
