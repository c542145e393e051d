//! Directory Write Lock
//!
//! Exclusive, non-blocking lock scoped to a directory. The lock is an
//! `flock(2)` on `<dir>/.lock`, so it is shared by every process that
//! mounts the same data directory and by every task within one process.
//! Contention is reported as "not acquired", never waited on.

use crate::error::{Error, Result};
use rustix::fs::{flock, FlockOperation};
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Name of the lock file created inside a locked directory
pub const LOCK_FILE_NAME: &str = ".lock";

// =============================================================================
// Write Guard
// =============================================================================

/// Held exclusive lock; released on drop
#[derive(Debug)]
pub struct WriteGuard {
    file: File,
    dir: PathBuf,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        // Closing the file would release it too
        let _ = flock(&self.file, FlockOperation::Unlock);
        trace!(path = %self.dir.display(), "Released write lock");
    }
}

// =============================================================================
// Acquisition
// =============================================================================

/// Try to take the write lock for `dir` without blocking.
///
/// Returns `Ok(None)` when another holder has it. `dir` must exist.
pub fn try_write_lock(dir: &Path) -> Result<Option<WriteGuard>> {
    let lock_error = |source: io::Error| Error::LockAcquisition {
        path: dir.to_path_buf(),
        source,
    };

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .mode(0o600)
        .open(dir.join(LOCK_FILE_NAME))
        .map_err(lock_error)?;

    match flock(&file, FlockOperation::NonBlockingLockExclusive) {
        Ok(()) => {
            trace!(path = %dir.display(), "Acquired write lock");
            Ok(Some(WriteGuard {
                file,
                dir: dir.to_path_buf(),
            }))
        }
        Err(errno) => {
            let err = io::Error::from(errno);
            if err.kind() == io::ErrorKind::WouldBlock {
                debug!(path = %dir.display(), "Write lock is held elsewhere");
                Ok(None)
            } else {
                Err(lock_error(err))
            }
        }
    }
}

/// Run `action` while holding the write lock for `dir`.
///
/// - `Ok(None)`: the lock was busy and `action` was never polled.
/// - `Ok(Some(v))`: `action` ran to completion under the lock.
/// - `Err(LockAcquisition)`: the lock could not be taken for another reason.
/// - any other `Err`: `action` itself failed while the lock was held.
pub async fn with_write_lock<T, F>(dir: &Path, action: F) -> Result<Option<T>>
where
    F: Future<Output = Result<T>>,
{
    let Some(guard) = try_write_lock(dir)? else {
        return Ok(None);
    };

    let result = action.await;
    drop(guard);
    result.map(Some)
}
