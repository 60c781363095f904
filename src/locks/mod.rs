//! File-backed queue storage for shared resources.
//!
//! Every shared resource (a serial port, a power switch, a capture card) is
//! represented by one small JSON queue file in the lock directory. The file
//! name is a readable form of the resource name plus a short digest of the
//! exact name:
//!
//! ```text
//! {lock_dir}/dev_ttyUSB0-3f4be79e.json        {"stack": [{"id": ..., "status": ..., "refresh": ...}]}
//! {lock_dir}/dev_ttyUSB0-3f4be79e.json.lock   mutex file, exists only during a read-modify-write
//! ```
//!
//! # Mutex Files
//!
//! Read-modify-write cycles on a queue file are serialized by a companion
//! mutex file created with **create_new** semantics (exclusive create). Its
//! contents (owner, pid, created_at) are diagnostic only; existence is what
//! holds the lock. A mutex file older than the configured orphan threshold is
//! assumed to belong to a crashed process and is reclaimed.
//!
//! # RAII Guards
//!
//! The mutex is managed through a [`StoreLock`] guard that removes the file
//! when dropped, on every exit path.

mod guard;
mod metadata;
mod store;
mod types;


pub use guard::StoreLock;
pub use metadata::MutexMetadata;
pub(crate) use metadata::get_owner_string;
pub use store::{LockfileStore, StoreSettings};
pub use types::{EntryStatus, QueueEntry, ResourceQueue};
