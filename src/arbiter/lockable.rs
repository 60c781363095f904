//! Capability interface for peripherals that share a physical resource.

use super::ResourceArbiter;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Anything that must be exclusively held before use.
///
/// Peripheral drivers embed a [`SharedResource`] and forward to it rather
/// than implementing the queue protocol themselves.
pub trait Lockable {
    /// Wait up to `max_wait` for exclusive use. `Ok(false)` means "try later".
    fn acquire(&self, max_wait: Duration) -> Result<bool>;

    fn release(&self) -> Result<()>;

    /// Whether this participant currently holds the resource.
    fn is_held(&self) -> Result<bool>;
}

/// One participant's handle on an arbitrated resource.
#[derive(Debug, Clone)]
pub struct SharedResource {
    arbiter: Arc<ResourceArbiter>,
    id: String,
}

impl SharedResource {
    pub fn new(arbiter: Arc<ResourceArbiter>, id: &str) -> Self {
        Self {
            arbiter,
            id: id.to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn resource(&self) -> &str {
        self.arbiter.resource()
    }
}

impl Lockable for SharedResource {
    fn acquire(&self, max_wait: Duration) -> Result<bool> {
        self.arbiter.acquire(&self.id, max_wait)
    }

    fn release(&self) -> Result<()> {
        self.arbiter.release(&self.id)
    }

    fn is_held(&self) -> Result<bool> {
        Ok(self.arbiter.holder()?.as_deref() == Some(self.id.as_str()))
    }
}
