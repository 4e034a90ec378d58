//! Prometheus HTTP API source

use super::MetricSource;
use crate::error::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Queries `/api/v1/query` and `/api/v1/query_range`
pub struct PrometheusSource {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum QueryData {
    Vector(Vec<InstantSeries>),
    Matrix(Vec<RangeSeries>),
    Scalar(SamplePair),
    String(SamplePair),
}

#[derive(Debug, Deserialize)]
struct InstantSeries {
    value: SamplePair,
}

#[derive(Debug, Deserialize)]
struct RangeSeries {
    values: Vec<SamplePair>,
}

/// `[unix_seconds, "value"]`
type SamplePair = (f64, String);

impl PrometheusSource {
    /// Create a source for the Prometheus server at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
        Ok(Self { client, base_url })
    }

    async fn query(&self, path: &str, params: &[(&str, String)]) -> Result<QueryData, FetchError> {
        let url = self.base_url.join(path)?;
        let response = self.client.get(url).query(params).send().await?;

        let status = response.status();
        let body = response.text().await?;

        let parsed: QueryResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            Err(e) => return Err(FetchError::Malformed(e.to_string())),
        };

        if parsed.status != "success" {
            return Err(FetchError::Query(
                parsed.error.unwrap_or_else(|| format!("status {}", parsed.status)),
            ));
        }
        parsed
            .data
            .ok_or_else(|| FetchError::Malformed("missing data".to_string()))
    }
}

fn parse_value(raw: &str) -> Result<f64, FetchError> {
    let value: f64 = raw
        .parse()
        .map_err(|_| FetchError::Malformed(format!("not a number: {raw}")))?;
    if !value.is_finite() {
        return Err(FetchError::Malformed(format!("non-finite value: {raw}")));
    }
    Ok(value)
}

fn to_timestamp(secs: f64) -> Result<DateTime<Utc>, FetchError> {
    Utc.timestamp_millis_opt((secs * 1000.0).round() as i64)
        .single()
        .ok_or_else(|| FetchError::Malformed(format!("bad timestamp: {secs}")))
}

#[async_trait]
impl MetricSource for PrometheusSource {
    async fn sample(&self, query: &str) -> Result<f64, FetchError> {
        let data = self
            .query("api/v1/query", &[("query", query.to_string())])
            .await?;

        match data {
            QueryData::Vector(series) => {
                debug!(query = %query, series = series.len(), "Instant query returned");
                series
                    .iter()
                    .map(|s| parse_value(&s.value.1))
                    .sum::<Result<f64, _>>()
            }
            QueryData::Scalar((_, raw)) => parse_value(&raw),
            QueryData::Matrix(_) | QueryData::String(_) => Err(FetchError::Malformed(
                "instant query returned a non-numeric result type".to_string(),
            )),
        }
    }

    async fn sample_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, FetchError> {
        let params = [
            ("query", query.to_string()),
            ("start", start.timestamp().to_string()),
            ("end", end.timestamp().to_string()),
            ("step", step.as_secs().max(1).to_string()),
        ];
        let data = self.query("api/v1/query_range", &params).await?;

        let QueryData::Matrix(series) = data else {
            return Err(FetchError::Malformed(
                "range query did not return a matrix".to_string(),
            ));
        };

        // Sum series point-wise, keyed by timestamp in milliseconds
        let mut summed: BTreeMap<i64, f64> = BTreeMap::new();
        for s in &series {
            for (ts, raw) in &s.values {
                let key = (ts * 1000.0).round() as i64;
                *summed.entry(key).or_insert(0.0) += parse_value(raw)?;
            }
        }

        summed
            .into_iter()
            .map(|(ms, v)| to_timestamp(ms as f64 / 1000.0).map(|ts| (ts, v)))
            .collect()
    }
}
