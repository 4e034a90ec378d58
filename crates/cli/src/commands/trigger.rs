//! `selfheal trigger`: send an action to the actuator service by hand

use anyhow::Result;
use detector_lib::actuator::{ActionRequest, ActionResponse};
use detector_lib::models::{ActionKind, ActionTarget};

use crate::client::ApiClient;
use crate::output::{print_error, print_json, print_success, OutputFormat};

pub struct TriggerArgs {
    pub action: String,
    pub namespace: String,
    pub name: Option<String>,
    pub selector: Option<String>,
    pub step: Option<u32>,
    pub max: Option<u32>,
    pub metric: String,
    pub value: f64,
}

impl TriggerArgs {
    fn into_request(self) -> ActionRequest {
        ActionRequest {
            metric: self.metric,
            value: self.value,
            zscore: None,
            action: ActionKind::from(self.action),
            target: ActionTarget {
                namespace: self.namespace,
                name: self.name,
                selector: self.selector,
                step: self.step,
                max: self.max,
                ..Default::default()
            },
        }
    }
}

/// Returns whether the actuator reported success
pub async fn trigger_action(
    client: &ApiClient,
    args: TriggerArgs,
    format: OutputFormat,
) -> Result<bool> {
    let request = args.into_request();
    let (status, response): (_, ActionResponse) = client.post("action", &request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            if response.ok {
                print_success(&format!("{}: {}", request.action, response.message));
            } else {
                print_error(&format!(
                    "{} rejected ({}): {}",
                    request.action, status, response.message
                ));
            }
        }
    }

    Ok(response.ok)
}
