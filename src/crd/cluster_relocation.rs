//! ClusterRelocation export envelope and type registry
//!
//! The relocation operator running inside the generated image reads a
//! `ClusterRelocation` object. This controller never talks to that API;
//! it only stamps the envelope with the right `apiVersion`/`kind` and
//! writes it to disk.

use crate::crd::cluster_config::{ClusterConfig, ClusterRelocationSpec};
use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

/// Kind name of the relocation descriptor
pub const CLUSTER_RELOCATION_KIND: &str = "ClusterRelocation";

// =============================================================================
// Type Registry
// =============================================================================

/// Serialization versions known for one kind
#[derive(Debug, Clone, Copy)]
pub struct KindEntry {
    pub kind: &'static str,
    pub group: &'static str,
    /// Ordered oldest to newest
    pub versions: &'static [&'static str],
}

/// Static table of kinds this controller serializes
#[derive(Debug, Clone, Copy)]
pub struct TypeRegistry {
    entries: &'static [KindEntry],
}

/// Resolved `apiVersion` and `kind` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMeta {
    pub api_version: String,
    pub kind: String,
}

/// Kinds registered by this controller
pub static DEFAULT_REGISTRY: TypeRegistry = TypeRegistry::new(&[
    KindEntry {
        kind: CLUSTER_RELOCATION_KIND,
        group: "rhsyseng.github.io",
        versions: &["v1beta1"],
    },
    KindEntry {
        kind: "ClusterConfig",
        group: "relocation.openshift.io",
        versions: &["v1alpha1"],
    },
    KindEntry {
        kind: "BareMetalHost",
        group: "metal3.io",
        versions: &["v1alpha1"],
    },
]);

impl TypeRegistry {
    pub const fn new(entries: &'static [KindEntry]) -> Self {
        Self { entries }
    }

    /// Resolve the most recent registered version of `kind`
    pub fn type_meta(&self, kind: &str) -> Result<TypeMeta> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.kind == kind)
            .ok_or_else(|| Error::Internal(format!("unable to find API version for {}", kind)))?;

        // if there are multiple assume the last is the most recent
        let version = entry
            .versions
            .last()
            .ok_or_else(|| Error::Internal(format!("no versions registered for {}", kind)))?;

        let api_version = if entry.group.is_empty() {
            version.to_string()
        } else {
            format!("{}/{}", entry.group, version)
        };

        Ok(TypeMeta {
            api_version,
            kind: entry.kind.to_string(),
        })
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// Relocation descriptor as read by the relocation operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRelocation {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ClusterRelocationSpec,
}

impl ClusterRelocation {
    /// Build the descriptor for `config`, stamped from `registry`
    pub fn for_config(config: &ClusterConfig, registry: &TypeRegistry) -> Result<Self> {
        let type_meta = registry.type_meta(CLUSTER_RELOCATION_KIND)?;

        Ok(Self {
            api_version: type_meta.api_version,
            kind: type_meta.kind,
            metadata: ObjectMeta {
                name: Some(config.name_any()),
                namespace: config.namespace(),
                ..Default::default()
            },
            spec: config.spec.relocation.clone(),
        })
    }
}
