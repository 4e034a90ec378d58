//! Forwarding actions to a remote actuator service

use crate::error::ExecutorError;
use crate::models::{ActionKind, ActionTarget};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Timeout for one forwarded request
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

/// Body accepted by the actuator's `POST /action`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub metric: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zscore: Option<f64>,
    pub action: ActionKind,
    pub target: ActionTarget,
}

/// Reply from the actuator service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub ok: bool,
    pub message: String,
}

/// POSTs action requests to `{endpoint}/action`
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
    url: Url,
    token: Option<String>,
}

impl HttpForwarder {
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder()
            .timeout(FORWARD_TIMEOUT)
            .build()?;
        let base = Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|e| ExecutorError::Command(format!("invalid actuator endpoint: {e}")))?;
        let url = Url::parse(&format!("{}/action", base.as_str().trim_end_matches('/')))
            .map_err(|e| ExecutorError::Command(format!("invalid actuator endpoint: {e}")))?;
        Ok(Self { client, url, token })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Forward a request; any non-2xx reply is an error carrying the body
    pub async fn forward(&self, request: &ActionRequest) -> Result<String, ExecutorError> {
        debug!(url = %self.url, action = %request.action, "Forwarding action");

        let mut builder = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(request);
        if let Some(token) = &self.token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ExecutorError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        // A well-formed reply carries its own message; otherwise report the raw body
        let message = match serde_json::from_str::<ActionResponse>(&body) {
            Ok(reply) => reply.message,
            Err(_) => body,
        };
        Ok(format!("remote {}: {}", status.as_u16(), message))
    }
}
