//! Diagnostic metadata written into mutex files.

use crate::error::{RackError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Contents of a mutex file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutexMetadata {
    /// Owner of the mutex (e.g., `user@HOST`).
    pub owner: String,

    /// Process ID of the holder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// When the mutex was taken.
    pub created_at: DateTime<Utc>,

    /// Resource whose queue is being modified.
    pub resource: String,
}

impl MutexMetadata {
    pub fn new(resource: &str) -> Self {
        Self {
            owner: get_owner_string(),
            pid: Some(std::process::id()),
            created_at: Utc::now(),
            resource: resource.to_string(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            RackError::StorageError(format!(
                "failed to read mutex file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            RackError::StorageError(format!(
                "failed to parse mutex file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            RackError::StorageError(format!("failed to serialize mutex metadata: {}", e))
        })
    }
}

impl std::fmt::Display for MutexMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.owner)?;
        if let Some(pid) = self.pid {
            write!(f, " (pid {})", pid)?;
        }
        write!(f, " since {}", self.created_at.to_rfc3339())
    }
}

/// `user@host` for the current process.
pub(crate) fn get_owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
