//! Error types for the Cluster Relocation Controller
//!
//! Provides structured error types for the reconcile loop, the export
//! directory lock, the cluster store adapters and startup configuration.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the controller
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Conflict updating {kind}/{name}: resource version changed")]
    Conflict { kind: String, name: String },

    // =========================================================================
    // Export Errors
    // =========================================================================
    #[error("Failed to acquire file lock on {}: {source}", path.display())]
    LockAcquisition {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {artifact}: {source}")]
    ArtifactWrite {
        artifact: String,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Delay before retrying after an optimistic concurrency conflict
pub const CONFLICT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Kube(_)
            | Error::ResourceNotFound { .. }
            | Error::LockAcquisition { .. }
            | Error::ArtifactWrite { .. }
            | Error::Io(_) => ErrorAction::RequeueWithBackoff,

            // A fresh read on the next attempt resolves the conflict
            Error::Conflict { .. } => ErrorAction::RequeueAfter(CONFLICT_RETRY_DELAY),

            // Retrying cannot fix these - wait for the object to change
            Error::Configuration(_) | Error::Internal(_) | Error::Serialization(_) => {
                ErrorAction::NoRequeue
            }
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is a "404" from the store
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ResourceNotFound { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Short label used for metrics and log fields
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::Internal(_) => "internal",
            Error::Configuration(_) => "configuration",
            Error::Kube(_) => "kube",
            Error::ResourceNotFound { .. } => "not_found",
            Error::Conflict { .. } => "conflict",
            Error::LockAcquisition { .. } => "lock",
            Error::ArtifactWrite { .. } => "artifact_write",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
        }
    }
}

/// Result type alias for the controller
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::Conflict {
            kind: "ClusterConfig".into(),
            name: "ns/foo".into(),
        };
        assert_eq!(err.action(), ErrorAction::RequeueAfter(CONFLICT_RETRY_DELAY));
        assert!(err.is_retryable());

        let err = Error::Configuration("bad config".into());
        assert_eq!(err.action(), ErrorAction::NoRequeue);

        let err = Error::ResourceNotFound {
            kind: "Secret".into(),
            name: "ns/pull-secret".into(),
        };
        assert_eq!(err.action(), ErrorAction::RequeueWithBackoff);
    }

    #[test]
    fn test_error_retryable() {
        let transient = Error::LockAcquisition {
            path: PathBuf::from("/data/namespaces/ns/foo"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(transient.is_retryable());

        let config_err = Error::Configuration("invalid".into());
        assert!(!config_err.is_retryable());
    }

    #[test]
    fn test_not_found_detection() {
        let err = Error::ResourceNotFound {
            kind: "BareMetalHost".into(),
            name: "ns/host".into(),
        };
        assert!(err.is_not_found());
        assert!(!Error::Internal("boom".into()).is_not_found());
    }
}
