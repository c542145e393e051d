//! Cluster Relocation Controller
//!
//! Watches `ClusterConfig` resources, exports their relocation settings
//! and referenced secrets to disk for the image builder, and points the
//! referenced metal3 `BareMetalHost` at the generated live ISO.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Reconciler (kube::runtime)                   │
//! │                                                                   │
//! │   ┌───────────────┐   ┌────────────────┐   ┌──────────────────┐   │
//! │   │   Finalizer   │──▶│  Data Exporter │──▶│  Host Image Sync │   │
//! │   │   Lifecycle   │   │  (flock'd dir) │   │  (merge patch)   │   │
//! │   └───────────────┘   └────────────────┘   └──────────────────┘   │
//! │            ▲                                                      │
//! │            │ ClusterConfig events + BareMetalHost reverse mapper  │
//! ├────────────┴─────────────────────────────────────────────────────┤
//! │               ClusterStore port (kube client / memory)            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controller`]: Reconcile steps and controller runtime wiring
//! - [`crd`]: Custom Resource Definitions
//! - [`domain`]: Core domain types and the store port
//! - [`error`]: Error types and handling
//! - [`filelock`]: Non-blocking directory lock
//! - [`store`]: Store adapters

pub mod controller;
pub mod crd;
pub mod domain;
pub mod error;
pub mod filelock;
pub mod store;

// Re-export commonly used types
pub use controller::{
    audit_host_references, run_controller, Context, ControllerConfig, ControllerMetrics,
    DataExporter, HostImageSync, Reconciler,
};

pub use crd::{
    BareMetalHost, BareMetalHostReference, BareMetalHostSpec, ClusterConfig, ClusterConfigSpec,
    ClusterConfigStatus, ClusterRelocation, HostImage, CLUSTER_CONFIG_FINALIZER,
};

pub use domain::ports::{ClusterStore, ClusterStoreRef, HostPatch, ObjectKey, ReconcileOutcome};

pub use error::{Error, ErrorAction, Result};

pub use store::{KubeStore, MemoryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
