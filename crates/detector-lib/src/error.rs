//! Error types for the detector library

use thiserror::Error;

/// Errors raised while loading or validating detector configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("duplicate metric name: {0}")]
    DuplicateMetric(String),

    #[error("inhibition rule references unknown metric: {0}")]
    UnknownInhibitSource(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors returned by a metric source. Always recovered per metric.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("metric source request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metric source returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("query rejected by metric source: {0}")]
    Query(String),

    #[error("malformed metric source response: {0}")]
    Malformed(String),

    #[error("invalid metric source url: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors raised inside an executor backend. They never escape the
/// executor; they are folded into a failed `ActionOutcome`.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    #[error("command failed: {0}")]
    Command(String),

    #[error("failed to spawn command: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{kind} requires target.{field}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("remote actuator returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("no remote actuator endpoint configured")]
    NoEndpoint,

    #[error("unknown action {0}")]
    UnknownAction(String),

    #[error("timed out after {0}s")]
    Timeout(u64),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
