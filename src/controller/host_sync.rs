//! Dependent-Resource Image Synchronizer
//!
//! Points a BareMetalHost at the relocation image, and takes it away
//! again on deletion. Only `online`, `image.url` and `image.diskFormat`
//! are ever written, and only when they differ from the target.

use crate::crd::{BareMetalHost, BareMetalHostReference, HostImage, LIVE_ISO_DISK_FORMAT};
use crate::domain::ports::{ClusterStoreRef, HostPatch, ImageChange, ObjectKey};
use crate::error::{Error, Result};
use tracing::{debug, info, warn};

/// Result of clearing a host's image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCleanup {
    /// Image removed with a patch
    Cleared,
    /// Host had no image, nothing written
    AlreadyClear,
    /// Host does not exist
    Missing,
}

/// Keeps BareMetalHost boot images in line with ClusterConfigs
pub struct HostImageSync {
    store: ClusterStoreRef,
}

impl HostImageSync {
    pub fn new(store: ClusterStoreRef) -> Self {
        Self { store }
    }

    /// Minimal patch moving `host` to boot the live ISO at `url`
    pub fn image_patch(host: &BareMetalHost, url: &str) -> HostPatch {
        let mut patch = HostPatch::default();

        if !host.spec.online {
            patch.online = Some(true);
        }

        let image_matches = host.spec.image.as_ref().is_some_and(|image| {
            image.url == url && image.disk_format.as_deref() == Some(LIVE_ISO_DISK_FORMAT)
        });
        if !image_matches {
            patch.image = ImageChange::Set(HostImage::live_iso(url));
        }

        patch
    }

    /// Patch the referenced host to boot from `url`.
    ///
    /// Returns whether a patch was issued.
    pub async fn set_image(&self, host_ref: &BareMetalHostReference, url: &str) -> Result<bool> {
        let key = ObjectKey::from(host_ref);
        let host = self
            .store
            .get_host(&key)
            .await?
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "BareMetalHost".to_string(),
                name: key.to_string(),
            })?;

        let patch = Self::image_patch(&host, url);
        if patch.is_empty() {
            debug!(host = %key, "BareMetalHost image already up to date");
            return Ok(false);
        }

        info!(host = %key, url, "Setting BareMetalHost image");
        self.store
            .patch_host(&key, host.metadata.resource_version.as_deref(), &patch)
            .await?;
        Ok(true)
    }

    /// Remove the image from the referenced host, if it still exists
    pub async fn clear_image(&self, host_ref: &BareMetalHostReference) -> Result<HostCleanup> {
        let key = ObjectKey::from(host_ref);
        let Some(host) = self.store.get_host(&key).await? else {
            warn!(host = %key, "Referenced BareMetalHost does not exist");
            return Ok(HostCleanup::Missing);
        };

        if host.spec.image.is_none() {
            return Ok(HostCleanup::AlreadyClear);
        }

        info!(host = %key, "Removing image from BareMetalHost");
        let patch = HostPatch {
            online: None,
            image: ImageChange::Clear,
        };
        self.store
            .patch_host(&key, host.metadata.resource_version.as_deref(), &patch)
            .await?;
        Ok(HostCleanup::Cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::BareMetalHostSpec;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    const URL: &str = "http://svc.svc-ns/images/ns/foo.iso";

    fn host(spec: BareMetalHostSpec) -> BareMetalHost {
        let mut host = BareMetalHost::new("host", spec);
        host.metadata.namespace = Some("hosts".into());
        host
    }

    fn host_ref() -> BareMetalHostReference {
        BareMetalHostReference {
            name: "host".into(),
            namespace: "hosts".into(),
        }
    }

    #[test]
    fn test_patch_for_bare_host() {
        let patch = HostImageSync::image_patch(&host(BareMetalHostSpec::default()), URL);
        assert_eq!(patch.online, Some(true));
        assert_eq!(patch.image, ImageChange::Set(HostImage::live_iso(URL)));
    }

    #[test]
    fn test_patch_only_differing_fields() {
        let spec = BareMetalHostSpec {
            online: true,
            image: Some(HostImage {
                url: URL.into(),
                disk_format: Some("raw".into()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let patch = HostImageSync::image_patch(&host(spec), URL);
        assert_eq!(patch.online, None);
        assert_eq!(patch.image, ImageChange::Set(HostImage::live_iso(URL)));
    }

    #[test]
    fn test_no_patch_when_converged() {
        let spec = BareMetalHostSpec {
            online: true,
            image: Some(HostImage::live_iso(URL)),
            ..Default::default()
        };
        assert!(HostImageSync::image_patch(&host(spec), URL).is_empty());
    }

    #[tokio::test]
    async fn test_set_image_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let key = store.insert_host(host(BareMetalHostSpec {
            boot_mac_address: Some("52:54:00:00:00:01".into()),
            ..Default::default()
        }));
        let sync = HostImageSync::new(store.clone());

        assert!(sync.set_image(&host_ref(), URL).await.unwrap());
        assert!(!sync.set_image(&host_ref(), URL).await.unwrap());
        assert_eq!(store.host_patch_count(), 1);

        let updated = store.host(&key).unwrap();
        assert!(updated.spec.online);
        assert_eq!(updated.spec.image, Some(HostImage::live_iso(URL)));
        assert_eq!(updated.spec.boot_mac_address.as_deref(), Some("52:54:00:00:00:01"));
    }

    #[tokio::test]
    async fn test_set_image_missing_host_is_error() {
        let store = Arc::new(MemoryStore::new());
        let sync = HostImageSync::new(store);

        let err = sync.set_image(&host_ref(), URL).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_clear_image() {
        let store = Arc::new(MemoryStore::new());
        let key = store.insert_host(host(BareMetalHostSpec {
            online: true,
            image: Some(HostImage::live_iso(URL)),
            ..Default::default()
        }));
        let sync = HostImageSync::new(store.clone());

        assert_eq!(sync.clear_image(&host_ref()).await.unwrap(), HostCleanup::Cleared);
        assert!(store.host(&key).unwrap().spec.image.is_none());

        assert_eq!(
            sync.clear_image(&host_ref()).await.unwrap(),
            HostCleanup::AlreadyClear
        );
        assert_eq!(store.host_patch_count(), 1);

        store.remove_host(&key);
        assert_eq!(sync.clear_image(&host_ref()).await.unwrap(), HostCleanup::Missing);
    }
}
