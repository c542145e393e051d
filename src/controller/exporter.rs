//! Locked Data Exporter
//!
//! Serializes a ClusterConfig and the secrets it references into
//! `<data_dir>/namespaces/<namespace>/<name>/files/` for the image
//! builder. The `<name>` directory is the lock scope: exports and
//! deletions of the same directory never interleave, across tasks and
//! across controller processes.

use crate::crd::{ClusterConfig, ClusterRelocation, SecretReference, DEFAULT_REGISTRY};
use crate::domain::ports::{ClusterStoreRef, ObjectKey, ReconcileOutcome};
use crate::error::{Error, Result};
use crate::filelock::with_write_lock;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Delay before retrying when the export directory is locked elsewhere
pub const LOCK_RETRY_DELAY: Duration = Duration::from_secs(5);

const NAMESPACES_DIR: &str = "namespaces";
const FILES_DIR: &str = "files";

// =============================================================================
// Artifacts
// =============================================================================

/// Files the image builder consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    ClusterRelocation,
    ApiCert,
    IngressCert,
    PullSecret,
    AcmSecret,
}

impl Artifact {
    pub const ALL: [Artifact; 5] = [
        Artifact::ClusterRelocation,
        Artifact::ApiCert,
        Artifact::IngressCert,
        Artifact::PullSecret,
        Artifact::AcmSecret,
    ];

    /// Fixed file name inside the files directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::ClusterRelocation => "cluster-relocation.json",
            Artifact::ApiCert => "api-cert-secret.json",
            Artifact::IngressCert => "ingress-cert-secret.json",
            Artifact::PullSecret => "pull-secret-secret.json",
            Artifact::AcmSecret => "acm-secret.json",
        }
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Artifact::ClusterRelocation => write!(f, "cluster relocation"),
            Artifact::ApiCert => write!(f, "api cert secret"),
            Artifact::IngressCert => write!(f, "ingress cert secret"),
            Artifact::PullSecret => write!(f, "pull secret"),
            Artifact::AcmSecret => write!(f, "ACM secret"),
        }
    }
}

/// Location of one ClusterConfig's exported data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDirs {
    /// Lock scope, removed as a whole on deletion
    pub lock_dir: PathBuf,
    /// Directory holding the artifact files
    pub files_dir: PathBuf,
}

// =============================================================================
// Data Exporter
// =============================================================================

/// Writes ClusterConfig data to disk under the directory lock
pub struct DataExporter {
    data_dir: PathBuf,
    store: ClusterStoreRef,
}

impl DataExporter {
    pub fn new(data_dir: impl Into<PathBuf>, store: ClusterStoreRef) -> Self {
        Self {
            data_dir: data_dir.into(),
            store,
        }
    }

    /// Export directories for `key`. Nothing is created.
    pub fn dirs(&self, key: &ObjectKey) -> ExportDirs {
        let lock_dir = self
            .data_dir
            .join(NAMESPACES_DIR)
            .join(&key.namespace)
            .join(&key.name);
        let files_dir = lock_dir.join(FILES_DIR);
        ExportDirs {
            lock_dir,
            files_dir,
        }
    }

    /// Write every artifact `config` calls for.
    ///
    /// Returns a delayed requeue when the directory is locked elsewhere.
    pub async fn export(&self, config: &ClusterConfig) -> Result<ReconcileOutcome> {
        let key = ObjectKey::of(config);
        let artifacts = self.collect(config).await?;

        let dirs = self.dirs(&key);
        create_private_dir(&dirs.files_dir).await?;

        let written = with_write_lock(
            &dirs.lock_dir,
            write_artifacts(&dirs.files_dir, &artifacts),
        )
        .await?;

        match written {
            Some(count) => {
                debug!(
                    config = %key,
                    written = count,
                    total = artifacts.len(),
                    "Exported input data"
                );
                Ok(ReconcileOutcome::NoOp)
            }
            None => {
                info!(config = %key, "requeueing due to lock contention");
                Ok(ReconcileOutcome::RequeueAfter(LOCK_RETRY_DELAY))
            }
        }
    }

    /// Remove the export directory for `key`, if any, under the lock
    pub async fn remove(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let dirs = self.dirs(key);

        match fs::metadata(&dirs.lock_dir).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ReconcileOutcome::NoOp),
            Err(e) => {
                return Err(Error::Io(io::Error::new(
                    e.kind(),
                    format!(
                        "failed to stat config directory {}: {}",
                        dirs.lock_dir.display(),
                        e
                    ),
                )))
            }
        }

        let removed = with_write_lock(&dirs.lock_dir, async {
            info!(config = %key, "Removing files for cluster config");
            fs::remove_dir_all(&dirs.lock_dir).await?;
            Ok(())
        })
        .await?;

        match removed {
            Some(()) => Ok(ReconcileOutcome::NoOp),
            None => {
                info!(config = %key, "requeueing due to lock contention");
                Ok(ReconcileOutcome::RequeueAfter(LOCK_RETRY_DELAY))
            }
        }
    }

    /// Serialize every artifact referenced by `config`.
    ///
    /// All remote reads happen here, before the lock is taken.
    async fn collect(&self, config: &ClusterConfig) -> Result<Vec<(Artifact, Vec<u8>)>> {
        let relocation = ClusterRelocation::for_config(config, &DEFAULT_REGISTRY)?;
        let mut artifacts = vec![(Artifact::ClusterRelocation, serde_json::to_vec(&relocation)?)];

        let spec = &config.spec;
        let references = [
            (Artifact::ApiCert, spec.relocation.api_cert_ref.as_ref()),
            (Artifact::IngressCert, spec.relocation.ingress_cert_ref.as_ref()),
            (Artifact::PullSecret, spec.relocation.pull_secret_ref.as_ref()),
            (
                Artifact::AcmSecret,
                spec.acm_registration.as_ref().map(|acm| &acm.acm_secret),
            ),
        ];

        for (artifact, reference) in references {
            if let Some(reference) = reference {
                artifacts.push((artifact, self.secret_bytes(reference).await?));
            }
        }

        Ok(artifacts)
    }

    async fn secret_bytes(&self, reference: &SecretReference) -> Result<Vec<u8>> {
        let key = ObjectKey::from(reference);
        let secret = self
            .store
            .get_secret(&key)
            .await?
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "Secret".to_string(),
                name: key.to_string(),
            })?;
        Ok(serde_json::to_vec(&secret)?)
    }
}

// =============================================================================
// File Helpers
// =============================================================================

async fn create_private_dir(path: &Path) -> Result<()> {
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
        .await?;
    Ok(())
}

/// Write artifacts in order, stopping at the first failure
async fn write_artifacts(files_dir: &Path, artifacts: &[(Artifact, Vec<u8>)]) -> Result<usize> {
    let mut written = 0;
    for (artifact, data) in artifacts {
        let changed = write_if_changed(&files_dir.join(artifact.file_name()), data)
            .await
            .map_err(|source| Error::ArtifactWrite {
                artifact: artifact.to_string(),
                source,
            })?;
        if changed {
            written += 1;
        }
    }
    Ok(written)
}

/// Overwrite `path` with `data` unless it already holds exactly that
async fn write_if_changed(path: &Path, data: &[u8]) -> io::Result<bool> {
    match fs::read(path).await {
        Ok(existing) if existing == data => return Ok(false),
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(true)
}
