//! Configuration model for rackshare.
//!
//! This module defines the Config struct that represents `rackshare.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, and validation of config values.

mod model;
mod operations;
pub mod types;

#[cfg(test)]
mod tests;

pub use model::Config;
pub use operations::DEFAULT_CONFIG_FILE;
pub use types::BeaconConfig;
