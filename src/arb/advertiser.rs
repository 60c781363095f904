//! Makes this node discoverable.
//!
//! The advertiser runs on its own tokio task, independent of whatever the
//! node is busy with. It sends an unsolicited beacon every heartbeat and
//! answers each roll-call after a random delay so that many nodes replying at
//! once do not collide. The owner talks to the task over a control channel:
//! `ping` is a liveness probe and `stop` is a shutdown handshake that waits
//! for the task to acknowledge and exit.

use super::beacon::{PeerBeacon, ROLL_CALL};
use super::node::NodeState;
use crate::error::{RackError, Result};
use chrono::Utc;
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// How long `ping` and `stop` wait for the task to answer.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct AdvertiserSettings {
    pub group: Ipv4Addr,
    pub rollcall_port: u16,
    pub beacon_port: u16,
    pub heartbeat: Duration,
    /// Upper bound of the random roll-call reply delay.
    pub rollcall_jitter: Duration,
    pub advertise_ip: Option<IpAddr>,
    pub checksum_len: usize,
}

#[derive(Debug)]
enum Control {
    Ping(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running advertiser task.
#[derive(Debug)]
pub struct BeaconAdvertiser {
    control: mpsc::Sender<Control>,
    task: JoinHandle<()>,
    rollcall_addr: SocketAddr,
    ip: IpAddr,
}

impl BeaconAdvertiser {
    /// Bind the roll-call socket and start advertising.
    pub async fn start(settings: AdvertiserSettings, state: NodeState) -> Result<Self> {
        let rollcall = bind_group_socket(settings.group, settings.rollcall_port).await?;
        let rollcall_addr = rollcall
            .local_addr()
            .map_err(|e| RackError::NetworkError(format!("failed to read roll-call address: {}", e)))?;

        let sender = UdpSocket::bind(sender_bind_addr(settings.group))
            .await
            .map_err(|e| RackError::NetworkError(format!("failed to bind beacon sender: {}", e)))?;
        if settings.group.is_multicast() {
            // Beacons stay on the local segment.
            sender
                .set_multicast_ttl_v4(1)
                .map_err(|e| RackError::NetworkError(format!("failed to set multicast TTL: {}", e)))?;
        }

        let ip = match settings.advertise_ip {
            Some(ip) => ip,
            None => detect_local_ip(settings.group).await,
        };

        let (control, control_rx) = mpsc::channel(8);
        let task = tokio::spawn(run(settings, state, ip, rollcall, sender, control_rx));
        info!(%ip, %rollcall_addr, "beacon advertiser started");

        Ok(Self {
            control,
            task,
            rollcall_addr,
            ip,
        })
    }

    /// Address roll-calls are received on.
    pub fn rollcall_addr(&self) -> SocketAddr {
        self.rollcall_addr
    }

    /// Address carried in this node's beacons.
    pub fn advertised_ip(&self) -> IpAddr {
        self.ip
    }

    /// Liveness probe: `true` if the task acknowledged in time.
    pub async fn ping(&self) -> bool {
        let (ack, acked) = oneshot::channel();
        if self.control.send(Control::Ping(ack)).await.is_err() {
            return false;
        }
        matches!(tokio::time::timeout(CONTROL_TIMEOUT, acked).await, Ok(Ok(())))
    }

    /// Ask the task to stop, wait for its acknowledgement, then for it to exit.
    pub async fn stop(self) -> Result<()> {
        let (ack, acked) = oneshot::channel();
        let delivered = self.control.send(Control::Shutdown(ack)).await.is_ok();
        let acknowledged = delivered
            && matches!(tokio::time::timeout(CONTROL_TIMEOUT, acked).await, Ok(Ok(())));

        if !acknowledged {
            self.task.abort();
            return Err(RackError::NetworkError(
                "beacon advertiser did not acknowledge shutdown".to_string(),
            ));
        }

        self.task
            .await
            .map_err(|e| RackError::NetworkError(format!("beacon advertiser task failed: {}", e)))?;
        info!("beacon advertiser stopped");
        Ok(())
    }
}

async fn run(
    settings: AdvertiserSettings,
    state: NodeState,
    ip: IpAddr,
    rollcall: UdpSocket,
    sender: UdpSocket,
    mut control_rx: mpsc::Receiver<Control>,
) {
    let target = SocketAddr::from((settings.group, settings.beacon_port));
    let mut heartbeat = tokio::time::interval(settings.heartbeat);
    let mut reply_at: Option<Instant> = None;
    let mut buf = [0u8; 512];

    loop {
        let deadline = reply_at;
        let reply_due = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            ctl = control_rx.recv() => match ctl {
                Some(Control::Ping(ack)) => {
                    let _ = ack.send(());
                }
                Some(Control::Shutdown(ack)) => {
                    let _ = ack.send(());
                    break;
                }
                // Handle dropped without stop(); nobody is left to advertise for.
                None => break,
            },
            received = rollcall.recv_from(&mut buf) => match received {
                Ok((n, from)) if &buf[..n] == ROLL_CALL.as_bytes() => {
                    // Several roll-calls inside one jitter window get one answer.
                    if reply_at.is_none() {
                        let delay = jitter(settings.rollcall_jitter);
                        debug!(%from, delay_ms = delay.as_millis() as u64, "roll-call received");
                        reply_at = Some(Instant::now() + delay);
                    }
                }
                Ok((n, from)) => debug!(%from, len = n, "ignoring unexpected datagram"),
                Err(e) => warn!(error = %e, "roll-call receive failed"),
            },
            _ = heartbeat.tick() => send_beacon(&sender, target, ip, &state, settings.checksum_len).await,
            _ = reply_due => {
                reply_at = None;
                send_beacon(&sender, target, ip, &state, settings.checksum_len).await;
            }
        }
    }
}

async fn send_beacon(
    sender: &UdpSocket,
    target: SocketAddr,
    ip: IpAddr,
    state: &NodeState,
    checksum_len: usize,
) {
    let beacon = PeerBeacon::new(ip, state.active_runs(), Utc::now(), checksum_len);
    match sender.send_to(beacon.encode().as_bytes(), target).await {
        Ok(_) => debug!(%target, runs = beacon.active_runs, "beacon sent"),
        Err(e) => warn!(%target, error = %e, "failed to send beacon"),
    }
}

fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let millis = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
    Duration::from_millis(millis)
}

/// Bind a socket that receives traffic addressed to `group:port`.
///
/// For a multicast group this binds the wildcard address and joins the group;
/// a unicast group binds that address directly.
pub(crate) async fn bind_group_socket(group: Ipv4Addr, port: u16) -> Result<UdpSocket> {
    let bind_ip = if group.is_multicast() {
        Ipv4Addr::UNSPECIFIED
    } else {
        group
    };
    let socket = UdpSocket::bind((bind_ip, port))
        .await
        .map_err(|e| RackError::NetworkError(format!("failed to bind {}:{}: {}", bind_ip, port, e)))?;

    if group.is_multicast() {
        socket
            .join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)
            .map_err(|e| RackError::NetworkError(format!("failed to join group {}: {}", group, e)))?;
    }
    Ok(socket)
}

/// Ephemeral local address for sending towards `group`.
pub(crate) fn sender_bind_addr(group: Ipv4Addr) -> SocketAddr {
    if group.is_multicast() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((group, 0))
    }
}

/// The local address the OS would route `group` traffic from.
async fn detect_local_ip(group: Ipv4Addr) -> IpAddr {
    let probe = async {
        let socket = UdpSocket::bind(sender_bind_addr(group)).await.ok()?;
        // connect() on UDP sends nothing; it only picks a route.
        socket.connect((group, 9)).await.ok()?;
        socket.local_addr().ok().map(|addr| addr.ip())
    };
    probe
        .await
        .filter(|ip| !ip.is_unspecified())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
