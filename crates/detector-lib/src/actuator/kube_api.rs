//! Workload operations through the Kubernetes API

use super::workload::{WorkloadOps, RESTARTED_AT_ANNOTATION};
use crate::error::ExecutorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use tracing::info;

/// In-cluster (or kubeconfig) API client
pub struct KubeWorkloads {
    client: Client,
}

impl KubeWorkloads {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using in-cluster config, falling back to the local kubeconfig
    pub async fn try_default() -> Result<Self, ExecutorError> {
        let client = Client::try_default().await?;
        info!("Connected to Kubernetes API");
        Ok(Self::new(client))
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn force_delete() -> DeleteParams {
        DeleteParams {
            grace_period_seconds: Some(0),
            ..DeleteParams::default()
        }
    }
}

#[async_trait]
impl WorkloadOps for KubeWorkloads {
    async fn replicas(&self, namespace: &str, name: &str) -> Result<u32, ExecutorError> {
        let deployment = self.deployments(namespace).get(name).await?;
        let replicas = deployment.spec.and_then(|s| s.replicas).unwrap_or(1);
        Ok(replicas.max(0) as u32)
    }

    async fn set_replicas(
        &self,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> Result<String, ExecutorError> {
        let patch = json!({ "spec": { "replicas": replicas } });
        self.deployments(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(format!("deployment.apps/{name} scaled to {replicas}"))
    }

    async fn delete_pods(&self, namespace: &str, selector: &str) -> Result<String, ExecutorError> {
        let params = ListParams::default().labels(selector);
        let message = self
            .pods(namespace)
            .delete_collection(&Self::force_delete(), &params)
            .await?
            .either(
                |pods| format!("deleted {} pod(s) matching {selector}", pods.items.len()),
                |_| format!("deletion of pods matching {selector} accepted"),
            );
        Ok(message)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<String, ExecutorError> {
        self.pods(namespace)
            .delete(name, &Self::force_delete())
            .await?;
        Ok(format!("pod/{name} deleted"))
    }

    async fn rollout_restart(
        &self,
        namespace: &str,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<String, ExecutorError> {
        let mut annotations = serde_json::Map::new();
        annotations.insert(
            RESTARTED_AT_ANNOTATION.to_string(),
            json!(at.timestamp().to_string()),
        );
        let patch = json!({
            "spec": { "template": { "metadata": { "annotations": annotations } } }
        });
        self.deployments(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(format!("deployment.apps/{name} restarted"))
    }
}
