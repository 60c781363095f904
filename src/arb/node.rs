//! Registry of the test runs executing on this node.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// A run currently executing on this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub id: u64,
    pub name: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    runs: BTreeMap<u64, RunInfo>,
}

/// Shared view of this node's load.
///
/// Cloning is cheap; the advertiser reads the run count for beacons and the
/// command server lists the runs on request.
#[derive(Debug, Clone, Default)]
pub struct NodeState {
    inner: Arc<Mutex<Registry>>,
}

impl NodeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run. It stays listed until the ticket is dropped.
    pub fn start_run(&self, name: &str) -> RunTicket {
        RunTicket {
            state: self.clone(),
            id: self.begin_run(name),
        }
    }

    /// Register a run owned by someone outside this process, such as a
    /// `lock run` on the same machine. It stays listed until [`finish_run`]
    /// is called with the returned id.
    ///
    /// [`finish_run`]: Self::finish_run
    pub fn begin_run(&self, name: &str) -> u64 {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.runs.insert(
            id,
            RunInfo {
                id,
                name: name.to_string(),
                started_at: Utc::now(),
            },
        );
        id
    }

    /// Remove a run; `false` if no run has that id.
    pub fn finish_run(&self, id: u64) -> bool {
        self.lock().runs.remove(&id).is_some()
    }

    pub fn active_runs(&self) -> u32 {
        u32::try_from(self.lock().runs.len()).unwrap_or(u32::MAX)
    }

    /// Running tasks in start order.
    pub fn running_tasks(&self) -> Vec<RunInfo> {
        self.lock().runs.values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

/// Keeps a run registered while alive.
#[derive(Debug)]
pub struct RunTicket {
    state: NodeState,
    id: u64,
}

impl RunTicket {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        self.state.lock().runs.remove(&self.id);
    }
}
