//! ClusterConfig Controller
//!
//! - [`config`]: startup settings and image URLs
//! - [`exporter`]: locked export of ClusterConfig data to disk
//! - [`host_sync`]: BareMetalHost image patching
//! - [`finalizer`]: Active / Terminating lifecycle
//! - [`mapper`]: BareMetalHost events back to ClusterConfigs
//! - [`reconciler`]: the reconcile driver and its `kube::runtime` wiring

pub mod config;
pub mod exporter;
pub mod finalizer;
pub mod host_sync;
pub mod mapper;
pub mod metrics;
pub mod reconciler;

pub use config::{image_url, ControllerConfig};
pub use exporter::{Artifact, DataExporter, ExportDirs, LOCK_RETRY_DELAY};
pub use finalizer::{FinalizerLifecycle, LifecycleStep};
pub use host_sync::{HostCleanup, HostImageSync};
pub use mapper::{audit_host_references, configs_for_host};
pub use metrics::ControllerMetrics;
pub use reconciler::{error_policy, reconcile, run_controller, Context, Reconciler};
