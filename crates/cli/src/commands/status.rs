//! `selfheal status`: detector health and readiness

use anyhow::Result;
use colored::Colorize;
use detector_lib::health::{ComponentStatus, HealthResponse, ReadinessResponse};
use serde::Serialize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, print_json, print_table, print_warning, OutputFormat};

#[derive(Tabled, Serialize)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Serialize)]
struct StatusReport {
    health: HealthResponse,
    readiness: ReadinessResponse,
}

fn status_name(status: ComponentStatus) -> &'static str {
    match status {
        ComponentStatus::Healthy => "healthy",
        ComponentStatus::Degraded => "degraded",
        ComponentStatus::Unhealthy => "unhealthy",
    }
}

/// Returns whether the detector is ready
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<bool> {
    let (_, health): (_, HealthResponse) = client.get("healthz").await?;
    let (_, readiness): (_, ReadinessResponse) = client.get("readyz").await?;
    let ready = readiness.ready;

    match format {
        OutputFormat::Json => print_json(&StatusReport { health, readiness })?,
        OutputFormat::Table => {
            println!("{}", "Detector Status".bold());
            println!("{}", "=".repeat(50));
            println!("Health:     {}", color_status(status_name(health.status)));
            println!(
                "Ready:      {}",
                color_status(if ready { "ready" } else { "not ready" })
            );
            if let Some(reason) = &readiness.reason {
                println!("Reason:     {}", reason);
            }
            if let Some(ts) = health.last_tick_timestamp {
                println!("Last tick:  {} (unix)", ts);
            }
            println!();

            let mut rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, c)| ComponentRow {
                    name: name.clone(),
                    status: color_status(status_name(c.status)),
                    message: c.message.clone().unwrap_or_default(),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            print_table(&rows, format)?;

            if !ready {
                print_warning("detector is not ready");
            }
        }
    }

    Ok(ready)
}
