//! Rackshare: shared-resource arbitration and peer discovery for hardware
//! test racks.
//!
//! Two independent subsystems live here:
//!
//! - [`arbiter`] serializes access to physical resources (serial ports,
//!   power switches) across unrelated processes using small queue files on a
//!   shared filesystem, with [`locks`] providing the file-level primitives.
//! - [`arb`] lets test nodes find each other by beacon and invoke a fixed set
//!   of commands on one another over TCP.

pub mod arb;
pub mod arbiter;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod locks;
pub mod logging;
