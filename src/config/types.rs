//! Configuration sub-sections and default values.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

/// Discovery settings shared by the advertiser and the directory client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    /// Group address for roll-calls and beacons. A unicast address such as
    /// `127.0.0.1` disables multicast membership (useful on a single host).
    #[serde(default = "default_group")]
    pub group: Ipv4Addr,

    /// Port advertisers listen on for roll-call requests.
    #[serde(default = "default_rollcall_port")]
    pub rollcall_port: u16,

    /// Port directory clients listen on for beacons.
    #[serde(default = "default_beacon_port")]
    pub beacon_port: u16,

    /// Seconds between unsolicited heartbeat beacons.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Upper bound of the random delay before answering a roll-call.
    #[serde(default = "default_rollcall_jitter_ms")]
    pub rollcall_jitter_ms: u64,

    /// Address to put in beacons. Detected from the routing table when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_ip: Option<IpAddr>,

    /// Drop beacons whose checksum does not match.
    #[serde(default)]
    pub verify_checksums: bool,

    /// Number of trailing MD5 hex characters carried on the wire.
    #[serde(default = "default_checksum_len")]
    pub checksum_len: usize,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            group: default_group(),
            rollcall_port: default_rollcall_port(),
            beacon_port: default_beacon_port(),
            heartbeat_secs: default_heartbeat_secs(),
            rollcall_jitter_ms: default_rollcall_jitter_ms(),
            advertise_ip: None,
            verify_checksums: false,
            checksum_len: default_checksum_len(),
        }
    }
}

// Default value functions for serde

pub(crate) fn default_lock_dir() -> PathBuf {
    std::env::temp_dir().join("rackshare")
}
pub(crate) fn default_refresh_interval_ms() -> u64 {
    5_000
}
pub(crate) fn default_stale_factor() -> u32 {
    3
}
pub(crate) fn default_mutex_attempts() -> u32 {
    100
}
pub(crate) fn default_mutex_retry_delay_ms() -> u64 {
    100
}
pub(crate) fn default_mutex_stale_secs() -> u64 {
    30
}
pub(crate) fn default_directory_ttl_secs() -> u64 {
    60
}
pub(crate) fn default_discovery_timeout_ms() -> u64 {
    5_000
}
pub(crate) fn default_command_port() -> u16 {
    10773
}
pub(crate) fn default_max_request_bytes() -> usize {
    4096
}
fn default_group() -> Ipv4Addr {
    Ipv4Addr::new(239, 255, 77, 77)
}
fn default_rollcall_port() -> u16 {
    10771
}
fn default_beacon_port() -> u16 {
    10772
}
fn default_heartbeat_secs() -> u64 {
    30
}
fn default_rollcall_jitter_ms() -> u64 {
    2_000
}
fn default_checksum_len() -> usize {
    8
}
