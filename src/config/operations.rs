//! Config loading, validation, and conversion into runtime settings.

use super::model::Config;
use crate::arb::{AdvertiserSettings, DirectorySettings};
use crate::arbiter::ArbiterSettings;
use crate::error::{RackError, Result};
use crate::locks::StoreSettings;
use std::path::Path;
use std::time::Duration;

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "rackshare.yaml";

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            RackError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load the explicit config path, or `rackshare.yaml` if present, or defaults.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file is not.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // serde_yaml rejects an empty document; treat it as "all defaults".
        let config: Config = if yaml.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(yaml)
                .map_err(|e| RackError::UserError(format!("failed to parse config YAML: {}", e)))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| RackError::UserError(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values.
    ///
    /// Validation rules:
    /// - intervals, factors and attempt counts must be positive
    /// - `beacon.checksum_len` must be within 1..=32 (an MD5 hex digest is 32 chars)
    /// - `max_request_bytes` must be positive
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("refresh_interval_ms", self.refresh_interval_ms),
            ("stale_factor", u64::from(self.stale_factor)),
            ("mutex_attempts", u64::from(self.mutex_attempts)),
            ("mutex_stale_secs", self.mutex_stale_secs),
            ("directory_ttl_secs", self.directory_ttl_secs),
            ("discovery_timeout_ms", self.discovery_timeout_ms),
            ("beacon.heartbeat_secs", self.beacon.heartbeat_secs),
            ("max_request_bytes", self.max_request_bytes as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(RackError::UserError(format!(
                    "config validation failed: {} must be greater than 0",
                    name
                )));
            }
        }

        if Duration::from_millis(self.refresh_interval_ms)
            .checked_mul(self.stale_factor)
            .is_none()
        {
            return Err(RackError::UserError(format!(
                "config validation failed: refresh_interval_ms * stale_factor overflows ({} * {})",
                self.refresh_interval_ms, self.stale_factor
            )));
        }

        if !(1..=32).contains(&self.beacon.checksum_len) {
            return Err(RackError::UserError(format!(
                "config validation failed: beacon.checksum_len must be between 1 and 32 (found {})",
                self.beacon.checksum_len
            )));
        }

        Ok(())
    }

    /// Mutex-file settings for the lockfile store.
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            attempts: self.mutex_attempts,
            retry_delay: Duration::from_millis(self.mutex_retry_delay_ms),
            mutex_stale_after: Duration::from_secs(self.mutex_stale_secs),
        }
    }

    /// Polling and staleness settings for the arbiter.
    pub fn arbiter_settings(&self) -> ArbiterSettings {
        ArbiterSettings {
            refresh_interval: Duration::from_millis(self.refresh_interval_ms),
            stale_factor: self.stale_factor,
        }
    }

    /// Settings for this node's beacon advertiser.
    pub fn advertiser_settings(&self) -> AdvertiserSettings {
        AdvertiserSettings {
            group: self.beacon.group,
            rollcall_port: self.beacon.rollcall_port,
            beacon_port: self.beacon.beacon_port,
            heartbeat: Duration::from_secs(self.beacon.heartbeat_secs),
            rollcall_jitter: Duration::from_millis(self.beacon.rollcall_jitter_ms),
            advertise_ip: self.beacon.advertise_ip,
            checksum_len: self.beacon.checksum_len,
        }
    }

    /// Settings for a peer directory client.
    pub fn directory_settings(&self) -> DirectorySettings {
        DirectorySettings {
            group: self.beacon.group,
            rollcall_port: self.beacon.rollcall_port,
            beacon_port: self.beacon.beacon_port,
            ttl: Duration::from_secs(self.directory_ttl_secs),
            discovery_timeout: Duration::from_millis(self.discovery_timeout_ms),
            verify_checksums: self.beacon.verify_checksums,
            checksum_len: self.beacon.checksum_len,
        }
    }
}
