//! Finalizer Lifecycle
//!
//! Decides whether a ClusterConfig converges or gets cleaned up. The
//! finalizer is recorded before any side effect, and removed only once
//! the export directory is gone and the host no longer boots the image.

use super::exporter::DataExporter;
use super::host_sync::{HostCleanup, HostImageSync};
use crate::crd::{ClusterConfig, CLUSTER_CONFIG_FINALIZER};
use crate::domain::ports::{ClusterStoreRef, ObjectKey, ReconcileOutcome};
use crate::error::Result;
use kube::ResourceExt;
use tracing::{debug, info};

/// What the reconcile should do after the finalizer step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStep {
    /// Active with the finalizer in place, continue converging
    Proceed,
    /// Stop here and report this outcome
    Halt(ReconcileOutcome),
}

/// Drives the Active / Terminating lifecycle of a ClusterConfig
pub struct FinalizerLifecycle<'a> {
    store: &'a ClusterStoreRef,
    exporter: &'a DataExporter,
    hosts: &'a HostImageSync,
}

impl<'a> FinalizerLifecycle<'a> {
    pub fn new(
        store: &'a ClusterStoreRef,
        exporter: &'a DataExporter,
        hosts: &'a HostImageSync,
    ) -> Self {
        Self {
            store,
            exporter,
            hosts,
        }
    }

    pub async fn step(&self, config: &ClusterConfig) -> Result<LifecycleStep> {
        if config.metadata.deletion_timestamp.is_some() {
            self.terminate(config).await
        } else {
            self.ensure_finalizer(config).await
        }
    }

    async fn ensure_finalizer(&self, config: &ClusterConfig) -> Result<LifecycleStep> {
        if has_finalizer(config) {
            return Ok(LifecycleStep::Proceed);
        }

        let key = ObjectKey::of(config);
        let mut finalizers = config.finalizers().to_vec();
        finalizers.push(CLUSTER_CONFIG_FINALIZER.to_string());

        info!(config = %key, "Adding finalizer");
        self.store
            .patch_config_finalizers(&key, config.resource_version().as_deref(), finalizers)
            .await?;
        Ok(LifecycleStep::Halt(ReconcileOutcome::RequeueNow))
    }

    async fn terminate(&self, config: &ClusterConfig) -> Result<LifecycleStep> {
        let key = ObjectKey::of(config);
        if !has_finalizer(config) {
            debug!(config = %key, "Deleting without our finalizer, nothing to clean up");
            return Ok(LifecycleStep::Halt(ReconcileOutcome::NoOp));
        }

        let removed = self.exporter.remove(&key).await?;
        if removed.is_requeue() {
            return Ok(LifecycleStep::Halt(removed));
        }

        if let Some(host_ref) = &config.spec.bare_metal_host_ref {
            match self.hosts.clear_image(host_ref).await? {
                HostCleanup::Missing => {
                    info!(config = %key, "BareMetalHost already gone, skipping image removal")
                }
                HostCleanup::Cleared | HostCleanup::AlreadyClear => {}
            }
        }

        let finalizers: Vec<String> = config
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != CLUSTER_CONFIG_FINALIZER)
            .cloned()
            .collect();

        info!(config = %key, "Removing finalizer");
        self.store
            .patch_config_finalizers(&key, config.resource_version().as_deref(), finalizers)
            .await?;
        Ok(LifecycleStep::Halt(ReconcileOutcome::NoOp))
    }
}

fn has_finalizer(config: &ClusterConfig) -> bool {
    config
        .finalizers()
        .iter()
        .any(|f| f == CLUSTER_CONFIG_FINALIZER)
}
