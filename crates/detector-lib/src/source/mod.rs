//! Metric sources
//!
//! A source turns a query string into one aggregate number (or a
//! time-ordered series of them). Multiple underlying series are summed and
//! an empty result is `0.0`, not an error.

mod prometheus_api;

pub use prometheus_api::PrometheusSource;

use crate::error::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Trait for metric query backends
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Current value of `query`
    async fn sample(&self, query: &str) -> Result<f64, FetchError>;

    /// Values of `query` between `start` and `end`, oldest first
    async fn sample_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, FetchError>;
}
