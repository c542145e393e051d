//! Cluster Store Adapters
//!
//! Implementations of [`ClusterStore`](crate::domain::ports::ClusterStore):
//! the kube client for production and an in-memory store for tests.

mod kube_client;
mod memory;

pub use kube_client::KubeStore;
pub use memory::MemoryStore;
