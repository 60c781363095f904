//! Client-side cache of peers discovered by roll-call.

use super::advertiser::{bind_group_socket, sender_bind_addr};
use super::beacon::{PeerBeacon, ROLL_CALL};
use crate::error::{RackError, Result};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DirectorySettings {
    pub group: Ipv4Addr,
    pub rollcall_port: u16,
    pub beacon_port: u16,
    /// Cached peers older than this are rebuilt by `list`.
    pub ttl: Duration,
    /// Collection window used by `list` when it refreshes.
    pub discovery_timeout: Duration,
    /// Drop beacons with a bad checksum instead of accepting them.
    pub verify_checksums: bool,
    pub checksum_len: usize,
}

/// Peers that answered the most recent roll-call.
#[derive(Debug)]
pub struct BeaconDirectory {
    settings: DirectorySettings,
    listener: UdpSocket,
    sender: UdpSocket,
    peers: BTreeMap<IpAddr, PeerBeacon>,
    last_refreshed: Option<Instant>,
}

impl BeaconDirectory {
    /// Bind the beacon listener. Nothing is sent until the first refresh.
    pub async fn bind(settings: DirectorySettings) -> Result<Self> {
        let listener = bind_group_socket(settings.group, settings.beacon_port).await?;
        let sender = UdpSocket::bind(sender_bind_addr(settings.group))
            .await
            .map_err(|e| RackError::NetworkError(format!("failed to bind roll-call sender: {}", e)))?;

        Ok(Self {
            settings,
            listener,
            sender,
            peers: BTreeMap::new(),
            last_refreshed: None,
        })
    }

    /// Address beacons are received on.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| RackError::NetworkError(format!("failed to read beacon address: {}", e)))
    }

    /// Send one roll-call and replace the cache with whatever answers within
    /// `timeout`. No answers is a normal outcome and yields an empty list.
    pub async fn refresh(&mut self, timeout: Duration) -> Result<Vec<PeerBeacon>> {
        self.drain_backlog();

        let target = SocketAddr::from((self.settings.group, self.settings.rollcall_port));
        self.sender
            .send_to(ROLL_CALL.as_bytes(), target)
            .await
            .map_err(|e| RackError::NetworkError(format!("failed to send roll-call to {}: {}", target, e)))?;

        let deadline = tokio::time::Instant::now() + timeout;
        let mut peers: BTreeMap<IpAddr, PeerBeacon> = BTreeMap::new();
        let mut buf = [0u8; 512];

        loop {
            let received = tokio::time::timeout_at(deadline, self.listener.recv_from(&mut buf)).await;
            let (n, from) = match received {
                Err(_) => break,
                Ok(Ok(datagram)) => datagram,
                Ok(Err(e)) => {
                    warn!(error = %e, "beacon receive failed");
                    continue;
                }
            };

            let Some(beacon) = self.accept(&buf[..n], from) else {
                continue;
            };
            let newer = peers
                .get(&beacon.ip)
                .is_none_or(|seen| beacon.timestamp >= seen.timestamp);
            if newer {
                peers.insert(beacon.ip, beacon);
            }
        }

        info!(peers = peers.len(), "roll-call complete");
        self.peers = peers;
        self.last_refreshed = Some(Instant::now());
        Ok(self.peers())
    }

    /// `(address, active runs)` of every known peer, refreshing first if the
    /// cache is empty or older than the TTL.
    pub async fn list(&mut self) -> Result<Vec<(IpAddr, u32)>> {
        if self.is_stale() {
            self.refresh(self.settings.discovery_timeout).await?;
        }
        Ok(self
            .peers
            .values()
            .map(|beacon| (beacon.ip, beacon.active_runs))
            .collect())
    }

    /// Cached beacons without refreshing.
    pub fn peers(&self) -> Vec<PeerBeacon> {
        self.peers.values().cloned().collect()
    }

    pub fn is_stale(&self) -> bool {
        self.peers.is_empty()
            || self
                .last_refreshed
                .is_none_or(|at| at.elapsed() > self.settings.ttl)
    }

    /// Forget the cache so the next `list` performs a roll-call.
    pub fn invalidate(&mut self) {
        self.last_refreshed = None;
    }

    fn accept(&self, datagram: &[u8], from: SocketAddr) -> Option<PeerBeacon> {
        let text = std::str::from_utf8(datagram).ok()?;
        let beacon = match PeerBeacon::parse(text) {
            Ok(beacon) => beacon,
            Err(e) => {
                debug!(%from, error = %e, "ignoring datagram");
                return None;
            }
        };

        if self.settings.verify_checksums && !beacon.checksum_valid() {
            warn!(%from, ip = %beacon.ip, "dropping beacon with bad checksum");
            return None;
        }
        Some(beacon)
    }

    /// Discard beacons queued since the last refresh; they may describe peers
    /// that have since gone away.
    fn drain_backlog(&self) {
        let mut buf = [0u8; 512];
        while self.listener.try_recv_from(&mut buf).is_ok() {}
    }
}
