//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a rackshare node.
///
/// This struct represents the contents of `rackshare.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Arbiter settings
    // =========================================================================
    /// Directory holding queue files and their mutex files.
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,

    /// How often waiters poll and holders re-stamp their queue entry.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// An entry is stale once its refresh is older than
    /// `stale_factor * refresh_interval_ms`.
    #[serde(default = "default_stale_factor")]
    pub stale_factor: u32,

    /// Attempts to create the mutex file before giving up.
    #[serde(default = "default_mutex_attempts")]
    pub mutex_attempts: u32,

    /// Delay between mutex-file attempts.
    #[serde(default = "default_mutex_retry_delay_ms")]
    pub mutex_retry_delay_ms: u64,

    /// Age after which a leftover mutex file is treated as orphaned.
    #[serde(default = "default_mutex_stale_secs")]
    pub mutex_stale_secs: u64,

    // =========================================================================
    // Discovery settings
    // =========================================================================
    #[serde(default)]
    pub beacon: BeaconConfig,

    /// Age after which the cached peer list is rebuilt.
    #[serde(default = "default_directory_ttl_secs")]
    pub directory_ttl_secs: u64,

    /// How long a roll-call collects answers.
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,

    // =========================================================================
    // Command server settings
    // =========================================================================
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    /// Maximum bytes read for one request.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_dir: default_lock_dir(),
            refresh_interval_ms: default_refresh_interval_ms(),
            stale_factor: default_stale_factor(),
            mutex_attempts: default_mutex_attempts(),
            mutex_retry_delay_ms: default_mutex_retry_delay_ms(),
            mutex_stale_secs: default_mutex_stale_secs(),
            beacon: BeaconConfig::default(),
            directory_ttl_secs: default_directory_ttl_secs(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
            command_port: default_command_port(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}
