//! Background re-stamping of a holder's queue entry.

use crate::locks::LockfileStore;
use chrono::Utc;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Predicate polled once per cycle; returning `false` stops the refresher and
/// lets the entry go stale.
pub type Liveness = Arc<dyn Fn() -> bool + Send + Sync>;

/// The default liveness predicate: the owning process is alive as long as it
/// is running this code.
pub fn always_alive() -> Liveness {
    Arc::new(|| true)
}

/// Keeps one id's `refresh` timestamp current while its holder works.
///
/// Runs on its own thread. Stopping is cooperative: `stop` signals the thread,
/// which exits at its next wake, and then joins it.
#[derive(Debug)]
pub struct LivenessRefresher {
    id: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LivenessRefresher {
    pub fn spawn(
        store: Arc<LockfileStore>,
        resource: String,
        id: String,
        interval: Duration,
        liveness: Liveness,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread_id = id.clone();

        let handle = std::thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    // Stop requested, or the owning arbiter is gone.
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }

                if !liveness() {
                    info!(
                        resource = %resource,
                        id = %thread_id,
                        "liveness check failed, no longer refreshing"
                    );
                    break;
                }

                let touched =
                    store.transact(&resource, |queue| Ok(queue.touch(&thread_id, Utc::now())));
                match touched {
                    Ok(true) => debug!(resource = %resource, id = %thread_id, "refreshed queue entry"),
                    Ok(false) => {
                        debug!(
                            resource = %resource,
                            id = %thread_id,
                            "entry no longer queued, refresher exiting"
                        );
                        break;
                    }
                    Err(e) => warn!(
                        resource = %resource,
                        id = %thread_id,
                        error = %e,
                        "failed to refresh queue entry"
                    ),
                }
            }
        });

        Self {
            id,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the background thread is still alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // The thread may already have exited on its own.
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!(id = %self.id, "refresher thread panicked");
        }
    }
}

impl Drop for LivenessRefresher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
