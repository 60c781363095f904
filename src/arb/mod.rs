//! Peer discovery and the remote command protocol.
//!
//! # Discovery
//!
//! Every node runs a [`BeaconAdvertiser`] that periodically sends a beacon
//! datagram (`ip,active_runs,timestamp,checksum`) to the beacon group and
//! answers each `ROBOT ROLL CALL` after a random delay. A client builds a
//! [`BeaconDirectory`] by sending one roll-call and collecting the beacons
//! that arrive within a window.
//!
//! # Commands
//!
//! A [`CommandServer`] accepts one textual method call per TCP connection,
//! for example `view_running_tasks()`, resolves it against a closed
//! [`CommandTable`] and writes back one length-prefixed reply:
//!
//! ```text
//! client -> server   raw UTF-8 request, no framing
//! server -> client   u32 big-endian length, then that many bytes
//! ```
//!
//! Failures are reported in-band as `ERROR: ...` payloads. The reply `DYING`
//! means the peer is shutting down.

mod advertiser;
mod beacon;
mod client;
mod directory;
mod dispatch;
mod error;
mod framing;
mod node;
mod server;


pub use advertiser::{AdvertiserSettings, BeaconAdvertiser};
pub use beacon::{PeerBeacon, ROLL_CALL, compute_checksum};
pub use client::{CommandClient, Reply};
pub use directory::{BeaconDirectory, DirectorySettings};
pub use dispatch::{
    CommandTable, DYING, HandlerFn, Literal, MethodCall, expect_int, expect_str, quote_str,
};
pub use error::ProtocolError;
pub use framing::{MAX_FRAME_LEN, encode_frame, read_frame, write_frame};
pub use node::{NodeState, RunInfo, RunTicket};
pub use server::CommandServer;
