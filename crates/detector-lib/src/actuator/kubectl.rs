//! Workload operations through a `kubectl` subprocess

use super::workload::WorkloadOps;
use crate::error::ExecutorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tracing::debug;

/// Shells out to kubectl; relies on its own kubeconfig resolution
pub struct KubectlWorkloads {
    binary: String,
}

impl KubectlWorkloads {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, namespace: &str, args: &[&str]) -> Result<String, ExecutorError> {
        debug!(binary = %self.binary, namespace = %namespace, args = ?args, "Running kubectl");

        let output = Command::new(&self.binary)
            .arg(format!("--namespace={namespace}"))
            .args(args)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            Ok(if stdout.is_empty() { stderr } else { stdout })
        } else if stderr.is_empty() {
            Err(ExecutorError::Command(format!("{} ({})", stdout, output.status)))
        } else {
            Err(ExecutorError::Command(stderr))
        }
    }
}

/// Read `spec.replicas` from `kubectl get deploy -o json` output
pub fn parse_replicas(json: &str) -> Result<u32, ExecutorError> {
    let object: serde_json::Value = serde_json::from_str(json)?;
    object["spec"]["replicas"]
        .as_u64()
        .map(|r| r as u32)
        .ok_or_else(|| ExecutorError::Command("deployment has no spec.replicas".to_string()))
}

#[async_trait]
impl WorkloadOps for KubectlWorkloads {
    async fn replicas(&self, namespace: &str, name: &str) -> Result<u32, ExecutorError> {
        let out = self.run(namespace, &["get", "deploy", name, "-o", "json"]).await?;
        parse_replicas(&out)
    }

    async fn set_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> Result<String, ExecutorError> {
        let deploy = format!("deploy/{name}");
        let count = format!("--replicas={replicas}");
        self.run(namespace, &["scale", &deploy, &count]).await
    }

    async fn delete_pods(&self, namespace: &str, selector: &str) -> Result<String, ExecutorError> {
        self.run(
            namespace,
            &["delete", "pod", "-l", selector, "--grace-period=0", "--force"],
        )
        .await
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<String, ExecutorError> {
        self.run(
            namespace,
            &["delete", "pod", name, "--grace-period=0", "--force"],
        )
        .await
    }

    async fn rollout_restart(
        &self,
        namespace: &str,
        name: &str,
        _at: DateTime<Utc>,
    ) -> Result<String, ExecutorError> {
        let deploy = format!("deploy/{name}");
        self.run(namespace, &["rollout", "restart", &deploy]).await
    }
}
