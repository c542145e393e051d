//! BareMetalHost (metal3.io)
//!
//! Externally owned resource. Only the fields this controller reads or
//! patches are modeled; unknown fields are ignored on read and never
//! written back, since every write is a merge patch of owned fields.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Disk format written for hosts booting the relocation image
pub const LIVE_ISO_DISK_FORMAT: &str = "live-iso";

/// Desired state of a metal3 BareMetalHost
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal3.io",
    version = "v1alpha1",
    kind = "BareMetalHost",
    plural = "baremetalhosts",
    shortname = "bmh",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostSpec {
    /// Whether the host should be powered on
    #[serde(default)]
    pub online: bool,

    /// Image the host should boot or provision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<HostImage>,

    /// MAC address of the boot NIC
    #[serde(
        default,
        rename = "bootMACAddress",
        skip_serializing_if = "Option::is_none"
    )]
    pub boot_mac_address: Option<String>,
}

/// Image details for a BareMetalHost
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostImage {
    /// Image URL
    pub url: String,

    /// Checksum or URL of the checksum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// md5, sha256 or sha512
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_type: Option<String>,

    /// raw, qcow2, vdi, vmdk or live-iso
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_format: Option<String>,
}

impl HostImage {
    /// Live ISO image served from `url`
    pub fn live_iso(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            checksum: None,
            checksum_type: None,
            disk_format: Some(LIVE_ISO_DISK_FORMAT.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_fields_ignored() {
        let raw = serde_json::json!({
            "apiVersion": "metal3.io/v1alpha1",
            "kind": "BareMetalHost",
            "metadata": {"name": "host", "namespace": "hosts"},
            "spec": {
                "online": true,
                "bmc": {"address": "redfish://10.0.0.1", "credentialsName": "bmc"},
                "bootMACAddress": "52:54:00:00:00:01",
                "image": {"url": "http://svc/images/ns/foo.iso", "diskFormat": "live-iso"}
            }
        });

        let host: BareMetalHost = serde_json::from_value(raw).unwrap();
        assert!(host.spec.online);
        assert_eq!(host.spec.boot_mac_address.as_deref(), Some("52:54:00:00:00:01"));
        assert_eq!(
            host.spec.image,
            Some(HostImage::live_iso("http://svc/images/ns/foo.iso"))
        );
    }

    #[test]
    fn test_missing_spec_fields_default() {
        let raw = serde_json::json!({
            "apiVersion": "metal3.io/v1alpha1",
            "kind": "BareMetalHost",
            "metadata": {"name": "host", "namespace": "hosts"},
            "spec": {}
        });

        let host: BareMetalHost = serde_json::from_value(raw).unwrap();
        assert!(!host.spec.online);
        assert!(host.spec.image.is_none());
    }
}
