//! ClusterConfig CRD
//!
//! Describes how a single-node cluster image should be relocated: the new
//! domain, certificates, pull secret, registry mirrors, and the optional
//! BareMetalHost that should boot the generated image.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer guarding the export directory and BareMetalHost cleanup
pub const CLUSTER_CONFIG_FINALIZER: &str = "clusterconfig.relocation.openshift.io/deprovision";

// =============================================================================
// ClusterConfig CRD
// =============================================================================

/// ClusterConfig is the user-authored request to relocate a cluster.
/// Its relocation settings are exported to disk for the image builder and,
/// when a BareMetalHost is referenced, the host is pointed at the image.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "relocation.openshift.io",
    version = "v1alpha1",
    kind = "ClusterConfig",
    plural = "clusterconfigs",
    status = "ClusterConfigStatus",
    printcolumn = r#"{"name": "Domain", "type": "string", "jsonPath": ".spec.domain"}"#,
    printcolumn = r#"{"name": "Host", "type": "string", "jsonPath": ".spec.bareMetalHostRef.name"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfigSpec {
    /// Settings handed to the relocation operator inside the image
    #[serde(flatten)]
    pub relocation: ClusterRelocationSpec,

    /// Registration with an ACM hub after relocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acm_registration: Option<AcmRegistration>,

    /// BareMetalHost that should boot the generated image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bare_metal_host_ref: Option<BareMetalHostReference>,
}

// =============================================================================
// Relocation Settings
// =============================================================================

/// The part of a ClusterConfig consumed by the relocation operator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRelocationSpec {
    /// TLS secret for the API server (self-signed when omitted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_cert_ref: Option<SecretReference>,

    /// CatalogSources to install on the cluster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catalog_sources: Vec<CatalogSource>,

    /// New base domain for the cluster
    pub domain: String,

    /// Mirror registry configuration
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_digest_mirrors: Vec<ImageDigestMirrors>,

    /// TLS secret for the ingress controller (self-signed when omitted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_cert_ref: Option<SecretReference>,

    /// Replacement for the cluster-wide pull secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_secret_ref: Option<SecretReference>,

    /// Additional trusted CA for the mirror registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_cert: Option<RegistryCert>,

    /// Authorized SSH keys appended for the 'core' user
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
}

// =============================================================================
// Sub-Types
// =============================================================================

/// Namespaced reference to a Secret
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SecretReference {
    pub name: String,
    pub namespace: String,
}

/// Namespaced reference to a BareMetalHost
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BareMetalHostReference {
    pub name: String,
    pub namespace: String,
}

/// ACM hub registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcmRegistration {
    /// Hub API URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Secret holding the hub credentials
    pub acm_secret: SecretReference,
}

/// Operator catalog to install
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CatalogSource {
    /// Name of the CatalogSource
    pub name: String,
    /// Operator-registry container image
    pub image: String,
}

/// Mirror definition for a source registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageDigestMirrors {
    /// Repository being mirrored
    pub source: String,

    /// Mirror repositories, in order of preference
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<String>,

    /// AllowContactingSource or NeverContactSource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror_source_policy: Option<String>,
}

/// Trusted CA for a registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCert {
    /// Hostname of the registry
    pub registry_hostname: String,

    /// Port the registry is served on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_port: Option<i32>,

    /// PEM encoded CA certificate
    pub certificate: String,
}

// =============================================================================
// Status
// =============================================================================

/// Status of the ClusterConfig
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfigStatus {
    /// Conditions
    #[serde(default)]
    pub conditions: Vec<ConfigCondition>,
}

/// A single observation of the ClusterConfig state
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigCondition {
    /// Condition type
    #[serde(rename = "type")]
    pub condition_type: String,

    /// True, False or Unknown
    pub status: String,

    /// Machine readable reason
    #[serde(default)]
    pub reason: Option<String>,

    /// Human readable message
    #[serde(default)]
    pub message: Option<String>,

    /// Last transition time (RFC 3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
}

impl ClusterConfigSpec {
    /// Spec with only a domain set
    pub fn with_domain(domain: impl Into<String>) -> Self {
        Self {
            relocation: ClusterRelocationSpec {
                domain: domain.into(),
                ..Default::default()
            },
            acm_registration: None,
            bare_metal_host_ref: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::CustomResourceExt;
    use kube::Resource;

    #[test]
    fn test_cluster_config_deserialize() {
        let raw = serde_json::json!({
            "apiVersion": "relocation.openshift.io/v1alpha1",
            "kind": "ClusterConfig",
            "metadata": {"name": "foo", "namespace": "ns"},
            "spec": {
                "domain": "example.com",
                "pullSecretRef": {"name": "pull", "namespace": "ns"},
                "sshKeys": ["ssh-ed25519 AAAA"],
                "acmRegistration": {"acmSecret": {"name": "acm", "namespace": "ns"}},
                "bareMetalHostRef": {"name": "host", "namespace": "hosts"}
            }
        });

        let config: ClusterConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(config.spec.relocation.domain, "example.com");
        assert_eq!(
            config.spec.relocation.pull_secret_ref,
            Some(SecretReference {
                name: "pull".into(),
                namespace: "ns".into()
            })
        );
        assert!(config.spec.relocation.api_cert_ref.is_none());
        assert_eq!(config.spec.acm_registration.unwrap().acm_secret.name, "acm");
        assert_eq!(config.spec.bare_metal_host_ref.unwrap().namespace, "hosts");
    }

    #[test]
    fn test_relocation_spec_omits_unset_fields() {
        let spec = ClusterConfigSpec::with_domain("example.com");
        let value = serde_json::to_value(&spec.relocation).unwrap();
        assert_eq!(value, serde_json::json!({"domain": "example.com"}));
    }

    #[test]
    fn test_crd_identity() {
        let crd = ClusterConfig::crd();
        assert_eq!(crd.spec.group, "relocation.openshift.io");
        assert_eq!(ClusterConfig::kind(&()), "ClusterConfig");
    }
}
