//! Custom Resource Definitions used by the controller
//!
//! This module contains all resource types:
//! - ClusterConfig: the relocation request this controller owns
//! - BareMetalHost: the metal3 host whose boot image is managed
//! - ClusterRelocation: the descriptor exported for the image builder

pub mod bare_metal_host;
pub mod cluster_config;
pub mod cluster_relocation;

pub use bare_metal_host::*;
pub use cluster_config::*;
pub use cluster_relocation::*;
