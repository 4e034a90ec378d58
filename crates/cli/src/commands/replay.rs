//! `selfheal replay`: run a metric's detector over recorded values offline

use anyhow::{Context, Result};
use detector_lib::config::DetectorConfig;
use detector_lib::store::SampleStore;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{color_status, format_score, print_info, print_json, print_table, OutputFormat};

#[derive(Debug, Tabled, Serialize)]
pub struct ReplayRow {
    #[tabled(rename = "#")]
    pub index: usize,
    #[tabled(rename = "Value")]
    pub value: f64,
    #[tabled(rename = "Score", display_with = "display_score")]
    pub score: Option<f64>,
    #[tabled(rename = "Result", display_with = "display_result")]
    pub detected: bool,
    #[tabled(skip)]
    pub fired: bool,
}

fn display_score(score: &Option<f64>) -> String {
    format_score(*score)
}

fn display_result(detected: &bool) -> String {
    color_status(if *detected { "fired" } else { "-" })
}

/// Parse numbers separated by whitespace, commas or newlines; `#` starts a comment
pub fn parse_values(input: &str) -> Result<Vec<f64>> {
    input
        .lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .flat_map(|line| line.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<f64>()
                .with_context(|| format!("invalid sample value {token:?}"))
        })
        .collect()
}

/// Feed `values` through the metric's detector, one poll interval apart
pub fn replay_values(
    config: &DetectorConfig,
    metric: &str,
    values: &[f64],
) -> Result<Vec<ReplayRow>> {
    let spec = config
        .metrics
        .iter()
        .find(|m| m.name == metric)
        .with_context(|| format!("metric {metric} is not configured"))?;

    let mut store = SampleStore::new(config.history_capacity, config.poll_interval_seconds);
    Ok(values
        .iter()
        .enumerate()
        .map(|(index, &value)| {
            let observation = store.observe(&spec.name, &spec.detection, value);
            ReplayRow {
                index,
                value,
                score: observation.evaluation.score,
                detected: observation.detected,
                fired: observation.evaluation.fired,
            }
        })
        .collect())
}

pub fn replay(
    config_path: &Path,
    metric: &str,
    values_path: &Path,
    only_detected: bool,
    format: OutputFormat,
) -> Result<()> {
    let config = DetectorConfig::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let input = if values_path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("failed to read values from stdin")?
    } else {
        std::fs::read_to_string(values_path)
            .with_context(|| format!("failed to read {}", values_path.display()))?
    };

    let values = parse_values(&input)?;
    let mut rows = replay_values(&config, metric, &values)?;
    let detections = rows.iter().filter(|r| r.detected).count();
    if only_detected {
        rows.retain(|r| r.detected);
    }

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            print_table(&rows, format)?;
            print_info(&format!(
                "{} of {} samples detected for {}",
                detections,
                values.len(),
                metric
            ));
        }
    }

    Ok(())
}
