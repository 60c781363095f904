//! RAII guard for a queue's mutex file.

use crate::error::{RackError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Proof that the caller holds the mutex file for one resource.
///
/// When dropped, the mutex file is deleted. If deletion fails, a warning is
/// logged but no panic occurs.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    released: bool,
}

impl StoreLock {
    pub(super) fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    /// Path to the mutex file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the mutex explicitly, surfacing any removal error.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        fs::remove_file(&self.path).map_err(|e| {
            RackError::LockingError(format!(
                "failed to release mutex '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = fs::remove_file(&self.path)
        {
            warn!(path = %self.path.display(), error = %e, "failed to release mutex file");
        }
    }
}
