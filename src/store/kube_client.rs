//! Kubernetes-backed cluster store
//!
//! Reads go straight to the API server; every write is a JSON merge
//! patch carrying `metadata.resourceVersion` so that a concurrent change
//! turns into a conflict instead of a lost update.

use crate::crd::{BareMetalHost, ClusterConfig};
use crate::domain::ports::{ClusterStore, HostPatch, ObjectKey};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use tracing::debug;

/// Cluster store on top of a kube client
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn configs(&self, namespace: &str) -> Api<ClusterConfig> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn hosts(&self, namespace: &str) -> Api<BareMetalHost> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map an API 409 to [`Error::Conflict`], pass everything else through
fn map_conflict(err: kube::Error, kind: &str, key: &ObjectKey) -> Error {
    match err {
        kube::Error::Api(resp) if resp.code == 409 => Error::Conflict {
            kind: kind.to_string(),
            name: key.to_string(),
        },
        other => Error::Kube(other),
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_config(&self, key: &ObjectKey) -> Result<Option<ClusterConfig>> {
        Ok(self.configs(&key.namespace).get_opt(&key.name).await?)
    }

    async fn list_configs(&self) -> Result<Vec<ClusterConfig>> {
        let api: Api<ClusterConfig> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn patch_config_finalizers(
        &self,
        key: &ObjectKey,
        resource_version: Option<&str>,
        finalizers: Vec<String>,
    ) -> Result<()> {
        let mut patch = json!({ "metadata": { "finalizers": finalizers } });
        if let Some(rv) = resource_version {
            patch["metadata"]["resourceVersion"] = json!(rv);
        }

        debug!(config = %key, "Patching ClusterConfig finalizers");
        self.configs(&key.namespace)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_conflict(e, "ClusterConfig", key))?;
        Ok(())
    }

    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn get_host(&self, key: &ObjectKey) -> Result<Option<BareMetalHost>> {
        Ok(self.hosts(&key.namespace).get_opt(&key.name).await?)
    }

    async fn patch_host(
        &self,
        key: &ObjectKey,
        resource_version: Option<&str>,
        patch: &HostPatch,
    ) -> Result<()> {
        let doc = patch.to_merge_patch(resource_version);

        debug!(host = %key, "Patching BareMetalHost");
        self.hosts(&key.namespace)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(&doc))
            .await
            .map_err(|e| map_conflict(e, "BareMetalHost", key))?;
        Ok(())
    }
}
