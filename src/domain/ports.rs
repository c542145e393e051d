//! Domain Ports - Core trait definitions for the relocation controller
//!
//! These types define the boundary between the reconcile logic and the
//! cluster API. Adapters implement [`ClusterStore`] to provide concrete
//! functionality (the kube client, or an in-memory fake for tests).

use crate::crd::{BareMetalHost, BareMetalHostReference, ClusterConfig, HostImage, SecretReference};
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Object Identity
// =============================================================================

/// Namespace and name of a namespaced object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of any namespaced kube object
    pub fn of<K: ResourceExt>(obj: &K) -> Self {
        Self::new(obj.namespace().unwrap_or_default(), obj.name_any())
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl From<&SecretReference> for ObjectKey {
    fn from(r: &SecretReference) -> Self {
        Self::new(&r.namespace, &r.name)
    }
}

impl From<&BareMetalHostReference> for ObjectKey {
    fn from(r: &BareMetalHostReference) -> Self {
        Self::new(&r.namespace, &r.name)
    }
}

// =============================================================================
// Reconcile Outcome
// =============================================================================

/// Retry intent produced by each reconcile step.
///
/// Errors are carried on the `Err` side of [`Result`] and always outrank
/// every variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Converged, wait for the next change
    NoOp,
    /// Run again as soon as possible
    RequeueNow,
    /// Run again after the given delay
    RequeueAfter(Duration),
}

impl ReconcileOutcome {
    /// Whether the remaining steps of a reconcile should be skipped
    pub fn is_requeue(&self) -> bool {
        !matches!(self, ReconcileOutcome::NoOp)
    }
}

// =============================================================================
// Host Patch
// =============================================================================

/// Change to the image field of a BareMetalHost
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImageChange {
    #[default]
    Keep,
    Set(HostImage),
    Clear,
}

/// Minimal change to the fields of a BareMetalHost this controller owns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostPatch {
    pub online: Option<bool>,
    pub image: ImageChange,
}

impl HostPatch {
    /// True when applying the patch would change nothing
    pub fn is_empty(&self) -> bool {
        self.online.is_none() && self.image == ImageChange::Keep
    }

    /// JSON merge patch, conditional on `resource_version` when given
    pub fn to_merge_patch(&self, resource_version: Option<&str>) -> serde_json::Value {
        let mut spec = serde_json::Map::new();
        if let Some(online) = self.online {
            spec.insert("online".into(), json!(online));
        }
        match &self.image {
            ImageChange::Keep => {}
            ImageChange::Set(image) => {
                spec.insert("image".into(), json!(image));
            }
            ImageChange::Clear => {
                spec.insert("image".into(), serde_json::Value::Null);
            }
        }

        let mut patch = json!({ "spec": spec });
        if let Some(rv) = resource_version {
            patch["metadata"] = json!({ "resourceVersion": rv });
        }
        patch
    }

    /// Apply the patch to a local copy of the host, with the same
    /// merge semantics the API server uses for absent fields
    pub fn apply_to(&self, host: &mut BareMetalHost) {
        if let Some(online) = self.online {
            host.spec.online = online;
        }
        match &self.image {
            ImageChange::Keep => {}
            ImageChange::Set(image) => {
                let current = host.spec.image.get_or_insert_with(HostImage::default);
                current.url = image.url.clone();
                if image.checksum.is_some() {
                    current.checksum = image.checksum.clone();
                }
                if image.checksum_type.is_some() {
                    current.checksum_type = image.checksum_type.clone();
                }
                if image.disk_format.is_some() {
                    current.disk_format = image.disk_format.clone();
                }
            }
            ImageChange::Clear => host.spec.image = None,
        }
    }
}

// =============================================================================
// Cluster Store Port
// =============================================================================

/// Port for reading and conditionally patching cluster objects
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Get a ClusterConfig, `None` when it does not exist
    async fn get_config(&self, key: &ObjectKey) -> Result<Option<ClusterConfig>>;

    /// List ClusterConfigs in all namespaces
    async fn list_configs(&self) -> Result<Vec<ClusterConfig>>;

    /// Replace the finalizer list of a ClusterConfig.
    ///
    /// Fails with a conflict if the object changed since `resource_version`.
    async fn patch_config_finalizers(
        &self,
        key: &ObjectKey,
        resource_version: Option<&str>,
        finalizers: Vec<String>,
    ) -> Result<()>;

    /// Get a Secret, `None` when it does not exist
    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<Secret>>;

    /// Get a BareMetalHost, `None` when it does not exist
    async fn get_host(&self, key: &ObjectKey) -> Result<Option<BareMetalHost>>;

    /// Apply a merge patch to a BareMetalHost.
    ///
    /// Fails with a conflict if the object changed since `resource_version`.
    async fn patch_host(
        &self,
        key: &ObjectKey,
        resource_version: Option<&str>,
        patch: &HostPatch,
    ) -> Result<()>;
}

pub type ClusterStoreRef = Arc<dyn ClusterStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::new("ns", "foo").to_string(), "ns/foo");
    }

    #[test]
    fn test_outcome_requeue() {
        assert!(!ReconcileOutcome::NoOp.is_requeue());
        assert!(ReconcileOutcome::RequeueNow.is_requeue());
        assert!(ReconcileOutcome::RequeueAfter(Duration::from_secs(5)).is_requeue());
    }

    #[test]
    fn test_host_patch_merge_document() {
        let patch = HostPatch {
            online: Some(true),
            image: ImageChange::Set(HostImage::live_iso("http://svc.ns/images/a/b.iso")),
        };
        let doc = patch.to_merge_patch(Some("42"));

        assert_eq!(doc["metadata"]["resourceVersion"], "42");
        assert_eq!(doc["spec"]["online"], true);
        assert_eq!(doc["spec"]["image"]["url"], "http://svc.ns/images/a/b.iso");
        assert_eq!(doc["spec"]["image"]["diskFormat"], "live-iso");
    }

    #[test]
    fn test_clear_patch_nulls_image_only() {
        let patch = HostPatch {
            online: None,
            image: ImageChange::Clear,
        };
        let doc = patch.to_merge_patch(None);

        assert_eq!(doc, json!({"spec": {"image": null}}));
        assert!(!patch.is_empty());
        assert!(HostPatch::default().is_empty());
    }
}
