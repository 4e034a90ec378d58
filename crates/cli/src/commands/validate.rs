//! `selfheal validate`: load a detector config and show what it will do

use anyhow::{Context, Result};
use colored::Colorize;
use detector_lib::config::DetectorConfig;
use detector_lib::models::{Detection, MetricSpec};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{print_success, print_table, print_warning, OutputFormat};

#[derive(Tabled, Serialize)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    name: String,
    #[tabled(rename = "Method")]
    method: String,
    #[tabled(rename = "Parameters")]
    parameters: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Target Key")]
    target_key: String,
}

fn describe(detection: &Detection) -> String {
    match detection {
        Detection::ZScore {
            threshold,
            consecutive,
        } => format!("threshold={threshold} consecutive={consecutive}"),
        Detection::Slope { slope_threshold } => format!("slope_threshold={slope_threshold}"),
        Detection::EwmaZscore {
            z_threshold,
            span_seconds,
            consecutive,
        } => format!("z_threshold={z_threshold} span={span_seconds}s consecutive={consecutive}"),
        Detection::WindowThreshold { gt, for_seconds } => format!("gt={gt} for={for_seconds}s"),
    }
}

fn row(metric: &MetricSpec) -> MetricRow {
    MetricRow {
        name: metric.name.clone(),
        method: metric.detection.method().to_string(),
        parameters: describe(&metric.detection),
        action: metric.action.kind.to_string(),
        target_key: metric.target_key().to_string(),
    }
}

pub fn validate_config(path: &Path, format: OutputFormat) -> Result<()> {
    let config = DetectorConfig::load(path)
        .with_context(|| format!("{} is not a valid detector config", path.display()))?;

    let rows: Vec<MetricRow> = config.metrics.iter().map(row).collect();

    match format {
        OutputFormat::Json => print_table(&rows, format)?,
        OutputFormat::Table => {
            print_success(&format!(
                "{} is valid ({} metrics)",
                path.display(),
                config.metrics.len()
            ));
            println!();
            println!("{}", "Settings".bold());
            println!("Prometheus:      {}", config.prometheus.url);
            println!("Poll interval:   {}s", config.poll_interval_seconds);
            println!("Cooldown:        {}s", config.cooldown_seconds);
            println!(
                "Budgets:         {} global / {} per target per hour",
                config.budgets.global_per_hour, config.budgets.per_target_per_hour
            );
            for rule in &config.inhibit {
                println!(
                    "Inhibit:         {} suppresses actions for {}s",
                    rule.when_metric, rule.suppress_actions_for_seconds
                );
            }
            if config.dry_run {
                print_warning("dry_run is on: actions will be logged, not executed");
            }
            for metric in config.metrics.iter().filter(|m| !m.action.kind.is_known()) {
                print_warning(&format!(
                    "metric {} uses unknown action {}; dispatch will fail",
                    metric.name, metric.action.kind
                ));
            }
            println!();
            print_table(&rows, format)?;
        }
    }

    Ok(())
}
