//! Beacon datagram format.
//!
//! A beacon is one ASCII line `ip,active_runs,unix_timestamp,checksum`, where
//! the checksum is the tail of the MD5 hex digest of `ip,active_runs,unix_timestamp`.

use super::error::ProtocolError;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use std::net::IpAddr;

/// Roll-call request soliciting an immediate beacon from every listening node.
pub const ROLL_CALL: &str = "ROBOT ROLL CALL";

/// One node's announcement of its address and load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerBeacon {
    pub ip: IpAddr,
    pub active_runs: u32,
    pub timestamp: DateTime<Utc>,
    pub checksum: String,
}

impl PeerBeacon {
    /// Build a beacon for this node, computing its checksum.
    pub fn new(ip: IpAddr, active_runs: u32, timestamp: DateTime<Utc>, checksum_len: usize) -> Self {
        // Second precision is all the wire carries.
        let timestamp = DateTime::from_timestamp(timestamp.timestamp(), 0).unwrap_or(timestamp);
        let checksum = compute_checksum(ip, active_runs, timestamp.timestamp(), checksum_len);
        Self {
            ip,
            active_runs,
            timestamp,
            checksum,
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "{},{},{},{}",
            self.ip,
            self.active_runs,
            self.timestamp.timestamp(),
            self.checksum
        )
    }

    /// Parse a datagram. The checksum is carried but not verified here.
    pub fn parse(datagram: &str) -> Result<Self, ProtocolError> {
        let fields: Vec<&str> = datagram.trim().split(',').collect();
        let [ip, runs, ts, checksum] = fields.as_slice() else {
            return Err(ProtocolError::MalformedBeacon(format!(
                "expected 4 fields, got {}",
                fields.len()
            )));
        };

        let ip: IpAddr = ip
            .parse()
            .map_err(|_| ProtocolError::MalformedBeacon(format!("bad address '{}'", ip)))?;
        let active_runs: u32 = runs
            .parse()
            .map_err(|_| ProtocolError::MalformedBeacon(format!("bad run count '{}'", runs)))?;
        let secs: i64 = ts
            .parse()
            .map_err(|_| ProtocolError::MalformedBeacon(format!("bad timestamp '{}'", ts)))?;
        let timestamp = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| ProtocolError::MalformedBeacon(format!("timestamp {} out of range", secs)))?;

        Ok(Self {
            ip,
            active_runs,
            timestamp,
            checksum: checksum.to_string(),
        })
    }

    /// Recompute the checksum at the carried length and compare.
    pub fn checksum_valid(&self) -> bool {
        let len = self.checksum.len();
        (1..=32).contains(&len)
            && compute_checksum(self.ip, self.active_runs, self.timestamp.timestamp(), len)
                .eq_ignore_ascii_case(&self.checksum)
    }
}

/// Last `len` hex characters of MD5(`ip,active_runs,timestamp`).
pub fn compute_checksum(ip: IpAddr, active_runs: u32, timestamp: i64, len: usize) -> String {
    let digest = Md5::digest(format!("{},{},{}", ip, active_runs, timestamp).as_bytes());
    let hex = hex::encode(digest);
    let len = len.min(hex.len());
    hex[hex.len() - len..].to_string()
}
