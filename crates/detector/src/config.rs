//! Process configuration

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

/// Settings for the detector process itself, read from `SELFHEAL_*` env vars.
/// Everything about metrics and actions lives in the detector config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Path of the detector config file
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// Port for health, metrics and the actuator service
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Name attached to every structured log event
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/selfheal/detector-config.yaml")
}

fn default_api_port() -> u16 {
    9103
}

fn default_instance_name() -> String {
    std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "selfheal-detector".to_string())
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            api_port: default_api_port(),
            instance_name: default_instance_name(),
        }
    }
}

impl AgentConfig {
    /// Load from the environment; unset values take their defaults
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("SELFHEAL").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
