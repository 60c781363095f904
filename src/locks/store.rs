//! Mutex-guarded read/modify/write access to queue files.

use super::guard::StoreLock;
use super::metadata::MutexMetadata;
use super::types::ResourceQueue;
use crate::error::{RackError, Result};
use crate::fs::{atomic_write, remove_if_exists};
use chrono::Utc;
use md5::{Digest, Md5};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Suffix appended to a queue file's name to form its mutex file.
const MUTEX_SUFFIX: &str = ".lock";

/// Hex characters of the name digest appended to every file stem.
const NAME_HASH_LEN: usize = 8;

/// Retry budget and orphan detection for mutex files.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Attempts to create the mutex file before failing with `LockingError`.
    pub attempts: u32,

    /// Sleep between attempts.
    pub retry_delay: Duration,

    /// A mutex file older than this is considered abandoned by a crashed process.
    pub mutex_stale_after: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            attempts: 100,
            retry_delay: Duration::from_millis(100),
            mutex_stale_after: Duration::from_secs(30),
        }
    }
}

/// Queue files for any number of resources under one directory.
///
/// The store holds no queue state in memory: every operation goes to disk, so
/// independent processes sharing the directory always see the same queues.
#[derive(Debug, Clone)]
pub struct LockfileStore {
    dir: PathBuf,
    settings: StoreSettings,
}

impl LockfileStore {
    pub fn new<P: Into<PathBuf>>(dir: P, settings: StoreSettings) -> Self {
        Self {
            dir: dir.into(),
            settings,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Queue file for a resource, e.g. `/dev/ttyUSB0` -> `{dir}/dev_ttyUSB0-3f4be79e.json`.
    pub fn queue_path(&self, resource: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem_for(resource)))
    }

    /// Mutex file guarding a resource's queue file.
    pub fn mutex_path(&self, resource: &str) -> PathBuf {
        let mut name = self.queue_path(resource).into_os_string();
        name.push(MUTEX_SUFFIX);
        PathBuf::from(name)
    }

    /// Take the mutex file for `resource`.
    ///
    /// The file is created with exclusive-create semantics; on contention the
    /// call sleeps `retry_delay` and tries again, up to `attempts` times. A
    /// mutex file older than `mutex_stale_after` is removed as orphaned.
    ///
    /// # Returns
    ///
    /// * `Ok(StoreLock)` - mutex held until the guard is dropped or released
    /// * `Err(RackError::LockingError)` - retry budget exhausted
    pub fn with_lock(&self, resource: &str) -> Result<StoreLock> {
        let path = self.mutex_path(resource);
        self.ensure_dir()?;

        for attempt in 1..=self.settings.attempts {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let json = MutexMetadata::new(resource).to_json()?;
                    // From here the guard owns the file, so any failure below removes it.
                    let lock = StoreLock::new(path.clone());
                    file.write_all(json.as_bytes()).map_err(|e| {
                        RackError::LockingError(format!("failed to write mutex metadata: {}", e))
                    })?;
                    return Ok(lock);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.reclaim_orphan(&path) {
                        continue;
                    }
                    debug!(resource, attempt, "mutex file busy, retrying");
                    std::thread::sleep(self.settings.retry_delay);
                }
                Err(e) => {
                    return Err(RackError::LockingError(format!(
                        "failed to create mutex '{}': {}",
                        path.display(),
                        e
                    )));
                }
            }
        }

        let holder = MutexMetadata::from_file(&path)
            .map(|meta| format!(" (held by {})", meta))
            .unwrap_or_default();
        Err(RackError::LockingError(format!(
            "mutex '{}' still held after {} attempts{}",
            path.display(),
            self.settings.attempts,
            holder
        )))
    }

    /// Read the persisted queue.
    ///
    /// # Returns
    ///
    /// * `Err(RackError::StorageError)` - file absent or not a queue document
    pub fn read(&self, resource: &str) -> Result<ResourceQueue> {
        let path = self.queue_path(resource);
        let content = fs::read_to_string(&path).map_err(|e| {
            RackError::StorageError(format!(
                "failed to read queue file '{}': {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            RackError::StorageError(format!(
                "failed to parse queue file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Read the persisted queue, or a fresh empty one if none exists yet.
    ///
    /// The empty queue is not written; the file appears on the first `write`.
    pub fn read_or_create(&self, resource: &str) -> Result<ResourceQueue> {
        if !self.queue_path(resource).exists() {
            return Ok(ResourceQueue::new());
        }
        self.read(resource)
    }

    /// Atomically replace the queue file, stamping the document's `refresh`.
    pub fn write(&self, resource: &str, queue: &mut ResourceQueue) -> Result<()> {
        queue.refresh = Some(Utc::now());
        let json = serde_json::to_string_pretty(queue).map_err(|e| {
            RackError::StorageError(format!("failed to serialize queue: {}", e))
        })?;
        atomic_write(self.queue_path(resource), json.as_bytes())
    }

    /// Delete the queue file. Returns `true` if one existed.
    pub fn remove(&self, resource: &str) -> Result<bool> {
        remove_if_exists(self.queue_path(resource))
    }

    /// Run one read-modify-write cycle under the mutex.
    ///
    /// The queue is persisted only if `f` succeeds; an empty result deletes
    /// the file instead of writing it.
    pub fn transact<T, F>(&self, resource: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut ResourceQueue) -> Result<T>,
    {
        let lock = self.with_lock(resource)?;
        let mut queue = self.read_or_create(resource)?;

        let out = f(&mut queue)?;

        if queue.is_empty() {
            self.remove(resource)?;
        } else {
            self.write(resource, &mut queue)?;
        }
        lock.release()?;
        Ok(out)
    }

    /// Forcefully delete a resource's mutex file. Intended for operators
    /// recovering from a crash; never called on the normal path.
    pub fn clear_mutex(&self, resource: &str) -> Result<Option<MutexMetadata>> {
        let path = self.mutex_path(resource);
        if !path.exists() {
            return Ok(None);
        }
        let meta = MutexMetadata::from_file(&path).ok();
        remove_if_exists(&path)?;
        Ok(meta)
    }

    fn ensure_dir(&self) -> Result<()> {
        if self.dir.exists() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|e| {
            RackError::StorageError(format!(
                "failed to create lock directory '{}': {}",
                self.dir.display(),
                e
            ))
        })
    }

    /// Remove a mutex file whose mtime is older than the orphan threshold.
    ///
    /// Two processes noticing the same orphan can still race here; the window
    /// only exists after a crash left a mutex behind.
    fn reclaim_orphan(&self, path: &Path) -> bool {
        let age = fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());

        let Some(age) = age else {
            return false;
        };
        if age <= self.settings.mutex_stale_after {
            return false;
        }

        let holder = MutexMetadata::from_file(path)
            .map(|meta| meta.to_string())
            .unwrap_or_else(|_| "unknown holder".to_string());
        match fs::remove_file(path) {
            Ok(()) => {
                warn!(
                    path = %path.display(),
                    age_secs = age.as_secs(),
                    %holder,
                    "reclaimed orphaned mutex file"
                );
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to reclaim orphaned mutex file");
                false
            }
        }
    }
}

/// Deterministic, filesystem-safe file stem for a resource name.
///
/// The readable part maps path separators and other punctuation to `_`; the
/// trailing MD5 prefix of the exact name keeps distinct resources apart, so
/// `bench/relay` and `bench_relay` never share a queue.
pub(crate) fn file_stem_for(resource: &str) -> String {
    let mapped: String = resource
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = mapped.trim_start_matches(['_', '.']);
    let readable = if trimmed.is_empty() { "resource" } else { trimmed };

    let digest = hex::encode(Md5::digest(resource.as_bytes()));
    format!("{}-{}", readable, &digest[..NAME_HASH_LEN])
}
