//! Persisted queue document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Whether an entry holds the resource or is waiting for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Queued,
    Active,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Queued => "queued",
            EntryStatus::Active => "active",
        }
    }
}

/// One contender in a resource's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Caller-supplied identifier, unique within the queue.
    pub id: String,

    pub status: EntryStatus,

    /// Last time the owner proved it was alive.
    pub refresh: DateTime<Utc>,
}

impl QueueEntry {
    /// A freshly queued entry.
    pub fn new(id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            status: EntryStatus::Queued,
            refresh: now,
        }
    }

    /// Time since the last refresh. A refresh in the future counts as zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.refresh)
            .to_std()
            .unwrap_or_default()
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        self.age(now) > stale_after
    }
}

/// FIFO queue for one resource.
///
/// Position 0 is the holder. At most one entry is `active`, and only ever the
/// one at position 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQueue {
    #[serde(default)]
    pub stack: Vec<QueueEntry>,

    /// Stamped by the store on every write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<DateTime<Utc>>,
}

impl ResourceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn head(&self) -> Option<&QueueEntry> {
        self.stack.first()
    }

    /// The current holder, if the head has already claimed the resource.
    pub fn active(&self) -> Option<&QueueEntry> {
        self.head().filter(|e| e.status == EntryStatus::Active)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.stack.iter().position(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Append `id` to the tail unless it is already queued, in which case its
    /// refresh is renewed in place. Returns the entry's position.
    pub fn enqueue(&mut self, id: &str, now: DateTime<Utc>) -> usize {
        if let Some(pos) = self.position(id) {
            self.stack[pos].refresh = now;
            return pos;
        }
        self.stack.push(QueueEntry::new(id, now));
        self.stack.len() - 1
    }

    /// Renew `id`'s refresh timestamp. Returns `false` if `id` is not queued.
    pub fn touch(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        match self.stack.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.refresh = now;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<QueueEntry> {
        let pos = self.position(id)?;
        Some(self.stack.remove(pos))
    }

    /// Drop every entry other than `keep` whose refresh is older than
    /// `stale_after`, regardless of position. Returns the evicted entries.
    pub fn evict_stale(
        &mut self,
        now: DateTime<Utc>,
        stale_after: Duration,
        keep: &str,
    ) -> Vec<QueueEntry> {
        let (stale, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.stack)
            .into_iter()
            .partition(|e| e.id != keep && e.is_stale(now, stale_after));
        self.stack = live;
        stale
    }

    /// Mark `id` active if it sits at position 0. Every other entry is forced
    /// back to `queued` so a hand-edited or legacy file cannot carry two holders.
    pub fn promote_head(&mut self, id: &str) -> bool {
        if self.head().map(|e| e.id.as_str()) != Some(id) {
            return false;
        }
        for (pos, entry) in self.stack.iter_mut().enumerate() {
            entry.status = if pos == 0 {
                EntryStatus::Active
            } else {
                EntryStatus::Queued
            };
        }
        true
    }

    pub fn pop_head(&mut self) -> Option<QueueEntry> {
        if self.stack.is_empty() {
            None
        } else {
            Some(self.stack.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn enqueue_does_not_duplicate() {
        let now = Utc::now();
        let mut queue = ResourceQueue::new();

        assert_eq!(queue.enqueue("a", now), 0);
        assert_eq!(queue.enqueue("b", now), 1);
        assert_eq!(queue.enqueue("a", now + ChronoDuration::seconds(1)), 0);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.stack[0].refresh, now + ChronoDuration::seconds(1));
    }

    #[test]
    fn promote_only_the_head() {
        let now = Utc::now();
        let mut queue = ResourceQueue::new();
        queue.enqueue("a", now);
        queue.enqueue("b", now);

        assert!(!queue.promote_head("b"));
        assert!(queue.active().is_none());

        assert!(queue.promote_head("a"));
        assert_eq!(queue.active().unwrap().id, "a");
        assert_eq!(queue.stack[1].status, EntryStatus::Queued);
    }

    #[test]
    fn promote_demotes_stray_active_entries() {
        let now = Utc::now();
        let mut queue = ResourceQueue::new();
        queue.enqueue("a", now);
        queue.enqueue("b", now);
        queue.stack[1].status = EntryStatus::Active;

        queue.promote_head("a");

        let active: Vec<_> = queue
            .stack
            .iter()
            .filter(|e| e.status == EntryStatus::Active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "a");
    }

    #[test]
    fn evict_stale_skips_keep_and_fresh_entries() {
        let now = Utc::now();
        let old = now - ChronoDuration::seconds(60);
        let mut queue = ResourceQueue::new();
        queue.enqueue("dead-head", old);
        queue.enqueue("alive", now);
        queue.enqueue("dead-waiter", old);
        queue.enqueue("me", old);

        let evicted = queue.evict_stale(now, Duration::from_secs(15), "me");

        let evicted_ids: Vec<_> = evicted.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(evicted_ids, vec!["dead-head", "dead-waiter"]);
        let remaining: Vec<_> = queue.stack.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(remaining, vec!["alive", "me"]);
    }

    #[test]
    fn future_refresh_is_not_stale() {
        let now = Utc::now();
        let entry = QueueEntry::new("a", now + ChronoDuration::seconds(30));
        assert_eq!(entry.age(now), Duration::ZERO);
        assert!(!entry.is_stale(now, Duration::from_secs(1)));
    }

    #[test]
    fn serializes_to_documented_shape() {
        let now = Utc::now();
        let mut queue = ResourceQueue::new();
        queue.enqueue("5", now);
        queue.promote_head("5");

        let value = serde_json::to_value(&queue).unwrap();
        assert_eq!(value["stack"][0]["id"], "5");
        assert_eq!(value["stack"][0]["status"], "active");
        assert!(value["stack"][0]["refresh"].is_string());
    }

    #[test]
    fn parses_document_without_top_level_refresh() {
        let json = r#"{"stack": [{"id": "x", "status": "queued", "refresh": "2024-01-01T00:00:00Z"}]}"#;
        let queue: ResourceQueue = serde_json::from_str(json).unwrap();
        assert_eq!(queue.len(), 1);
        assert!(queue.refresh.is_none());
        assert_eq!(queue.head().unwrap().status, EntryStatus::Queued);
    }
}
