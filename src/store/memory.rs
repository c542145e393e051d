//! In-Memory Cluster Store
//!
//! Behaves like a tiny API server: objects carry resource versions,
//! stale writes conflict, and a deleting object disappears once its last
//! finalizer is removed. Used as the cluster fake in tests.

use crate::crd::{BareMetalHost, ClusterConfig};
use crate::domain::ports::{ClusterStore, HostPatch, ObjectKey};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory cluster store
#[derive(Default)]
pub struct MemoryStore {
    configs: RwLock<BTreeMap<ObjectKey, ClusterConfig>>,
    hosts: RwLock<BTreeMap<ObjectKey, BareMetalHost>>,
    secrets: RwLock<BTreeMap<ObjectKey, Secret>>,
    /// Last issued resource version
    resource_version: AtomicU64,
    /// Number of BareMetalHost patches applied
    host_patches: AtomicU64,
    /// Number of ClusterConfig patches applied
    config_patches: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self, meta: &mut ObjectMeta) {
        let rv = self.resource_version.fetch_add(1, Ordering::SeqCst) + 1;
        meta.resource_version = Some(rv.to_string());
    }

    fn check_version(
        current: &ObjectMeta,
        expected: Option<&str>,
        kind: &str,
        key: &ObjectKey,
    ) -> Result<()> {
        match expected {
            Some(rv) if current.resource_version.as_deref() != Some(rv) => Err(Error::Conflict {
                kind: kind.to_string(),
                name: key.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn not_found(kind: &str, key: &ObjectKey) -> Error {
        Error::ResourceNotFound {
            kind: kind.to_string(),
            name: key.to_string(),
        }
    }

    // =========================================================================
    // Fixture Management
    // =========================================================================

    /// Create or replace a ClusterConfig
    pub fn insert_config(&self, mut config: ClusterConfig) -> ObjectKey {
        let key = ObjectKey::of(&config);
        self.next_version(&mut config.metadata);
        self.configs.write().insert(key.clone(), config);
        key
    }

    /// Create or replace a BareMetalHost
    pub fn insert_host(&self, mut host: BareMetalHost) -> ObjectKey {
        let key = ObjectKey::of(&host);
        self.next_version(&mut host.metadata);
        self.hosts.write().insert(key.clone(), host);
        key
    }

    /// Create or replace a Secret
    pub fn insert_secret(&self, mut secret: Secret) -> ObjectKey {
        let key = ObjectKey::new(
            secret.metadata.namespace.clone().unwrap_or_default(),
            secret.metadata.name.clone().unwrap_or_default(),
        );
        self.next_version(&mut secret.metadata);
        self.secrets.write().insert(key.clone(), secret);
        key
    }

    /// Request deletion of a ClusterConfig.
    ///
    /// Objects holding finalizers only get a deletion timestamp.
    pub fn delete_config(&self, key: &ObjectKey) {
        let mut configs = self.configs.write();
        let Some(config) = configs.get_mut(key) else {
            return;
        };
        if config.metadata.finalizers.as_ref().map_or(true, |f| f.is_empty()) {
            configs.remove(key);
            return;
        }
        if config.metadata.deletion_timestamp.is_none() {
            config.metadata.deletion_timestamp = Some(Time(Utc::now()));
            self.next_version(&mut config.metadata);
        }
    }

    /// Remove a BareMetalHost outright
    pub fn remove_host(&self, key: &ObjectKey) {
        self.hosts.write().remove(key);
    }

    /// Current copy of a ClusterConfig
    pub fn config(&self, key: &ObjectKey) -> Option<ClusterConfig> {
        self.configs.read().get(key).cloned()
    }

    /// Current copy of a BareMetalHost
    pub fn host(&self, key: &ObjectKey) -> Option<BareMetalHost> {
        self.hosts.read().get(key).cloned()
    }

    /// Number of BareMetalHost patches applied so far
    pub fn host_patch_count(&self) -> u64 {
        self.host_patches.load(Ordering::SeqCst)
    }

    /// Number of ClusterConfig patches applied so far
    pub fn config_patch_count(&self) -> u64 {
        self.config_patches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn get_config(&self, key: &ObjectKey) -> Result<Option<ClusterConfig>> {
        Ok(self.configs.read().get(key).cloned())
    }

    async fn list_configs(&self) -> Result<Vec<ClusterConfig>> {
        Ok(self.configs.read().values().cloned().collect())
    }

    async fn patch_config_finalizers(
        &self,
        key: &ObjectKey,
        resource_version: Option<&str>,
        finalizers: Vec<String>,
    ) -> Result<()> {
        let mut configs = self.configs.write();
        let config = configs
            .get_mut(key)
            .ok_or_else(|| Self::not_found("ClusterConfig", key))?;
        Self::check_version(&config.metadata, resource_version, "ClusterConfig", key)?;

        let released = finalizers.is_empty() && config.metadata.deletion_timestamp.is_some();
        config.metadata.finalizers = if finalizers.is_empty() {
            None
        } else {
            Some(finalizers)
        };
        self.next_version(&mut config.metadata);
        self.config_patches.fetch_add(1, Ordering::SeqCst);

        if released {
            configs.remove(key);
        }
        Ok(())
    }

    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<Secret>> {
        Ok(self.secrets.read().get(key).cloned())
    }

    async fn get_host(&self, key: &ObjectKey) -> Result<Option<BareMetalHost>> {
        Ok(self.hosts.read().get(key).cloned())
    }

    async fn patch_host(
        &self,
        key: &ObjectKey,
        resource_version: Option<&str>,
        patch: &HostPatch,
    ) -> Result<()> {
        let mut hosts = self.hosts.write();
        let host = hosts
            .get_mut(key)
            .ok_or_else(|| Self::not_found("BareMetalHost", key))?;
        Self::check_version(&host.metadata, resource_version, "BareMetalHost", key)?;

        patch.apply_to(host);
        self.next_version(&mut host.metadata);
        self.host_patches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
