//! Filesystem utilities for rackshare.
//!
//! Queue files are the durable source of truth for every shared resource, so
//! they are only ever replaced through an atomic write.

pub mod atomic;

pub use atomic::{atomic_write, remove_if_exists};
