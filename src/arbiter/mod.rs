//! FIFO arbitration of a shared resource across independent processes.
//!
//! Each contender appends itself to the resource's queue file and polls every
//! `refresh_interval` until it reaches position 0, at which point it marks
//! itself `active` and holds the resource. There is no broker and no push
//! notification: every waiter re-reads the whole queue on every poll.
//!
//! # Staleness
//!
//! Holders and waiters keep their entries fresh (holders through a
//! [`LivenessRefresher`], waiters on every poll). Any entry whose refresh is
//! older than `stale_factor * refresh_interval` is evicted by whichever waiter
//! notices it first, which is how crashed participants are reclaimed.
//!
//! # Example
//!
//! ```no_run
//! use rackshare::arbiter::{ArbiterSettings, ResourceArbiter};
//! use rackshare::locks::{LockfileStore, StoreSettings};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = Arc::new(LockfileStore::new("/tmp/rackshare", StoreSettings::default()));
//! let arbiter = ResourceArbiter::new(store, "/dev/ttyUSB0", ArbiterSettings::default());
//! if arbiter.acquire("slot-3", Duration::from_secs(60))? {
//!     // ... use the serial port ...
//!     arbiter.release("slot-3")?;
//! }
//! # Ok::<(), rackshare::error::RackError>(())
//! ```

mod lockable;
mod refresher;


pub use lockable::{Lockable, SharedResource};
pub use refresher::{Liveness, LivenessRefresher, always_alive};

use crate::error::{RackError, Result};
use crate::locks::{EntryStatus, LockfileStore, ResourceQueue};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Polling cadence and staleness bound.
#[derive(Debug, Clone)]
pub struct ArbiterSettings {
    /// How often waiters poll and holders re-stamp.
    pub refresh_interval: Duration,

    /// Entries older than `stale_factor * refresh_interval` are evicted.
    pub stale_factor: u32,
}

impl ArbiterSettings {
    pub fn stale_after(&self) -> Duration {
        self.refresh_interval.saturating_mul(self.stale_factor)
    }
}

impl Default for ArbiterSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5),
            stale_factor: 3,
        }
    }
}

/// Acquire/release over one named resource.
///
/// The arbiter only caches which ids *this process* is refreshing; the queue
/// itself lives on disk and is shared with every other process.
pub struct ResourceArbiter {
    store: Arc<LockfileStore>,
    resource: String,
    settings: ArbiterSettings,
    refreshers: Mutex<HashMap<String, LivenessRefresher>>,
}

impl ResourceArbiter {
    pub fn new(store: Arc<LockfileStore>, resource: &str, settings: ArbiterSettings) -> Self {
        Self {
            store,
            resource: resource.to_string(),
            settings,
            refreshers: Mutex::new(HashMap::new()),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn settings(&self) -> &ArbiterSettings {
        &self.settings
    }

    /// Wait up to `max_wait` for `id` to hold the resource.
    ///
    /// Returns `Ok(true)` once `id` is at the head of the queue (a
    /// [`LivenessRefresher`] is then running for it), or `Ok(false)` if
    /// `max_wait` elapsed first, in which case `id` has been removed from the
    /// queue. Calling again for an id that is already queued does not
    /// duplicate it.
    pub fn acquire(&self, id: &str, max_wait: Duration) -> Result<bool> {
        self.acquire_with(id, max_wait, always_alive())
    }

    /// [`acquire`](Self::acquire) with a custom liveness predicate for the
    /// refresher started on success.
    pub fn acquire_with(&self, id: &str, max_wait: Duration, liveness: Liveness) -> Result<bool> {
        validate_id(id)?;

        let deadline = Instant::now() + max_wait;
        let stale_after = self.settings.stale_after();

        loop {
            let now = Utc::now();
            let (promoted, position, evicted) = self.store.transact(&self.resource, |queue| {
                let evicted = queue.evict_stale(now, stale_after, id);
                let position = queue.enqueue(id, now);
                let promoted = queue.promote_head(id);
                Ok((promoted, position, evicted))
            })?;

            for entry in &evicted {
                warn!(
                    resource = %self.resource,
                    evicted = %entry.id,
                    status = entry.status.as_str(),
                    age_ms = entry.age(now).as_millis() as u64,
                    "evicted stale queue entry"
                );
            }

            if promoted {
                info!(resource = %self.resource, id, "acquired resource");
                self.start_refresher(id, liveness);
                return Ok(true);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.store
                    .transact(&self.resource, |queue| Ok(queue.remove(id)))?;
                info!(resource = %self.resource, id, "gave up waiting for resource");
                return Ok(false);
            }

            debug!(resource = %self.resource, id, position, "waiting for resource");
            std::thread::sleep(remaining.min(self.settings.refresh_interval));
        }
    }

    /// Give up the resource held by `id`.
    ///
    /// Fails with `ArbiterError`, leaving the queue untouched, unless `id` is
    /// the active entry at the head. The next entry is not woken; it notices on its own poll.
    /// Blocks until `id`'s refresher has stopped.
    pub fn release(&self, id: &str) -> Result<()> {
        let popped = self.store.transact(&self.resource, |queue| {
            match queue.head() {
                Some(head) if head.id == id && head.status == EntryStatus::Active => {}
                Some(head) if head.id == id => {
                    return Err(RackError::ArbiterError(format!(
                        "'{}' cannot release '{}': it is next in line but has not acquired it",
                        id, self.resource
                    )));
                }
                Some(head) => {
                    return Err(RackError::ArbiterError(format!(
                        "'{}' cannot release '{}': it is held by '{}'",
                        id, self.resource, head.id
                    )));
                }
                None => {
                    return Err(RackError::ArbiterError(format!(
                        "'{}' cannot release '{}': nobody holds it",
                        id, self.resource
                    )));
                }
            }
            queue.pop_head();
            Ok(queue.head().map(|next| next.id.clone()))
        });

        match popped {
            Ok(next) => {
                self.stop_refresher(id);
                info!(resource = %self.resource, id, next = ?next, "released resource");
                Ok(())
            }
            Err(e) => {
                // A holder evicted while stalled has nothing left to refresh.
                if matches!(e, RackError::ArbiterError(_))
                    && !self.snapshot().map(|q| q.contains(id)).unwrap_or(true)
                {
                    self.stop_refresher(id);
                }
                Err(e)
            }
        }
    }

    /// Unmediated read of the queue for display. Never base acquire/release
    /// decisions on this.
    pub fn snapshot(&self) -> Result<ResourceQueue> {
        self.store.read_or_create(&self.resource)
    }

    /// Id of the current active holder, if any.
    pub fn holder(&self) -> Result<Option<String>> {
        Ok(self.snapshot()?.active().map(|e| e.id.clone()))
    }

    /// Whether this process is refreshing `id`.
    pub fn is_refreshing(&self, id: &str) -> bool {
        self.lock_refreshers()
            .get(id)
            .is_some_and(|r| r.is_running())
    }

    fn start_refresher(&self, id: &str, liveness: Liveness) {
        let mut refreshers = self.lock_refreshers();
        if refreshers.get(id).is_some_and(|r| r.is_running()) {
            return;
        }
        let refresher = LivenessRefresher::spawn(
            Arc::clone(&self.store),
            self.resource.clone(),
            id.to_string(),
            self.settings.refresh_interval,
            liveness,
        );
        // Replacing a finished refresher joins its thread on drop.
        refreshers.insert(id.to_string(), refresher);
    }

    fn stop_refresher(&self, id: &str) {
        let refresher = self.lock_refreshers().remove(id);
        if let Some(refresher) = refresher {
            refresher.stop();
        }
    }

    fn lock_refreshers(&self) -> MutexGuard<'_, HashMap<String, LivenessRefresher>> {
        self.refreshers
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl std::fmt::Debug for ResourceArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceArbiter")
            .field("resource", &self.resource)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(RackError::ArbiterError(
            "queue identifier must not be empty".to_string(),
        ));
    }
    Ok(())
}
