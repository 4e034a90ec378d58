//! Operator CLI for the self-healing detector
//!
//! Validates detector configs, replays recorded series through a metric's
//! detector, and talks to a running detector's API.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{replay, status, trigger, validate};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "selfheal")]
#[command(author, version, about = "CLI for the self-healing detector", long_about = None)]
pub struct Cli {
    /// Detector API URL (defaults to the config file, then http://localhost:9103)
    #[arg(long, env = "SELFHEAL_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Bearer token for the actuator service
    #[arg(long, env = "SELFHEAL_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate a detector config
    Validate {
        /// Path to the detector config (YAML, TOML or JSON)
        config: PathBuf,
    },

    /// Run a metric's detector over recorded values
    Replay {
        /// Path to the detector config
        config: PathBuf,

        /// Metric whose detector to run
        #[arg(long, short)]
        metric: String,

        /// File with one value per line or comma separated; `-` reads stdin
        #[arg(long, short = 'i', default_value = "-")]
        values: PathBuf,

        /// Only show samples that were detected
        #[arg(long)]
        only_detected: bool,
    },

    /// Show detector health and readiness
    Status,

    /// Send an action to the detector's actuator service
    Trigger {
        /// Action kind (restart_pod, rollout_restart, scale_up, scale_down, ...)
        action: String,

        /// Target namespace
        #[arg(long, short)]
        namespace: String,

        /// Target deployment or pod name
        #[arg(long)]
        name: Option<String>,

        /// Target label selector
        #[arg(long, short = 'l')]
        selector: Option<String>,

        /// Replica step for scale_up / scale_down
        #[arg(long)]
        step: Option<u32>,

        /// Replica ceiling for scaling actions
        #[arg(long)]
        max: Option<u32>,

        /// Metric name recorded with the request
        #[arg(long, default_value = "manual")]
        metric: String,

        /// Metric value recorded with the request
        #[arg(long, default_value_t = 0.0)]
        value: f64,
    },
}

async fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Validate { config } => {
            validate::validate_config(&config, cli.format)?;
            Ok(true)
        }
        Commands::Replay {
            config,
            metric,
            values,
            only_detected,
        } => {
            replay::replay(&config, &metric, &values, only_detected, cli.format)?;
            Ok(true)
        }
        Commands::Status => {
            let settings = config::Config::load()?;
            let client = client::ApiClient::new(&settings.api_url(cli.api_url))?;
            status::show_status(&client, cli.format).await
        }
        Commands::Trigger {
            action,
            namespace,
            name,
            selector,
            step,
            max,
            metric,
            value,
        } => {
            let settings = config::Config::load()?;
            let token = cli.token.or(settings.token.clone());
            let client = client::ApiClient::new(&settings.api_url(cli.api_url))?.with_token(token);
            let args = trigger::TriggerArgs {
                action,
                namespace,
                name,
                selector,
                step,
                max,
                metric,
                value,
            };
            trigger::trigger_action(&client, args, cli.format).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
