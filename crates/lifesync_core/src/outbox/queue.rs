//! Bounded FIFO queue of unacknowledged events, mirrored to key-value storage.
//!
//! # Responsibility
//! - Keep one context's pending events in memory and in its storage key.
//! - Apply the configured overflow policy on every append.
//!
//! # Invariants
//! - Order is append order; nothing reorders entries.
//! - Persisted and in-memory lists never exceed `capacity`.
//! - Storage failures are logged and swallowed on the UI-facing paths.
//! - Corrupt persisted content reads as an empty list (or with the corrupt
//!   entries skipped), never as an error.

use crate::model::event::QueuedEvent;
use crate::storage::kv::{KeyValueStore, StorageResult};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Storage key prefix for per-context queue namespaces.
pub const OUTBOX_KEY_PREFIX: &str = "outbox:v1:";

/// What to shed when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the head so the most recent `capacity` events survive.
    #[default]
    DropOldest,
    /// Refuse the incoming event and keep the existing `capacity` events.
    DropNewest,
}

impl OverflowPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DropOldest => "drop_oldest",
            Self::DropNewest => "drop_newest",
        }
    }
}

/// Result of one `enqueue` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queued after evicting the oldest entry.
    QueuedEvicting { evicted: Uuid },
    /// Refused because the queue is full under `DropNewest`.
    Refused,
}

pub struct DurableQueue {
    store: Arc<dyn KeyValueStore>,
    key: String,
    capacity: usize,
    policy: OverflowPolicy,
    entries: Mutex<Vec<QueuedEvent>>,
}

impl DurableQueue {
    /// Opens the queue for `namespace`, loading whatever was persisted.
    ///
    /// A zero `capacity` is raised to 1.
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        namespace: &str,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> Self {
        let key = namespace_key(namespace);
        let capacity = capacity.max(1);
        let mut entries = read_list(store.as_ref(), &key);
        let shed = shed_overflow(&mut entries, capacity, policy);
        if shed > 0 {
            warn!(
                "event=outbox_overflow module=outbox status=shed phase=open policy={} dropped={} capacity={}",
                policy.as_str(),
                shed,
                capacity
            );
        }
        Self {
            store,
            key,
            capacity,
            policy,
            entries: Mutex::new(entries),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Returns the in-memory entries in queue order.
    pub fn snapshot(&self) -> Vec<QueuedEvent> {
        self.entries().clone()
    }

    /// Appends at the tail and persists the full list.
    pub fn enqueue(&self, event: QueuedEvent) -> EnqueueOutcome {
        let mut entries = self.entries();
        let outcome = if entries.len() < self.capacity {
            entries.push(event);
            EnqueueOutcome::Queued
        } else {
            match self.policy {
                OverflowPolicy::DropOldest => {
                    let evicted = entries.remove(0).event_id;
                    entries.push(event);
                    warn!(
                        "event=outbox_overflow module=outbox status=shed policy=drop_oldest dropped_event_id={} capacity={}",
                        evicted, self.capacity
                    );
                    EnqueueOutcome::QueuedEvicting { evicted }
                }
                OverflowPolicy::DropNewest => {
                    warn!(
                        "event=outbox_overflow module=outbox status=shed policy=drop_newest dropped_event_id={} capacity={}",
                        event.event_id, self.capacity
                    );
                    return EnqueueOutcome::Refused;
                }
            }
        };
        self.persist_or_log(&entries, "enqueue");
        outcome
    }

    /// Reads the persisted list for this namespace.
    pub fn read_all(&self) -> Vec<QueuedEvent> {
        read_list(self.store.as_ref(), &self.key)
    }

    /// Replaces the in-memory and persisted list with `remaining`.
    pub fn commit(&self, remaining: Vec<QueuedEvent>) {
        let mut entries = self.entries();
        *entries = remaining;
        shed_overflow(&mut entries, self.capacity, self.policy);
        self.persist_or_log(&entries, "commit");
    }

    /// Removes exactly the listed events, keeping everything else in order.
    ///
    /// Returns how many entries were removed. Entries appended after the
    /// caller took its snapshot are untouched.
    pub fn acknowledge(&self, event_ids: &[Uuid]) -> usize {
        if event_ids.is_empty() {
            return 0;
        }
        let settled: HashSet<&Uuid> = event_ids.iter().collect();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|event| !settled.contains(&event.event_id));
        let removed = before - entries.len();
        if removed > 0 {
            self.persist_or_log(&entries, "acknowledge");
        }
        removed
    }

    /// Empties the queue. Returns how many events were discarded.
    pub fn purge(&self) -> usize {
        let mut entries = self.entries();
        let discarded = entries.len();
        entries.clear();
        self.persist_or_log(&entries, "purge");
        discarded
    }

    /// Merges events from an orphaned namespace into this queue.
    ///
    /// Both lists keep their internal order; they are interleaved by
    /// `enqueued_at` and deduplicated by `event_id`. Unlike the UI-facing
    /// paths this reports storage failures so the caller can keep the
    /// foreign copy when the merge did not land.
    pub(crate) fn absorb(&self, foreign: Vec<QueuedEvent>) -> StorageResult<usize> {
        let mut entries = self.entries();
        let mut seen: HashSet<Uuid> = entries.iter().map(|event| event.event_id).collect();
        let foreign: Vec<QueuedEvent> = foreign
            .into_iter()
            .filter(|event| seen.insert(event.event_id))
            .collect();
        let absorbed = foreign.len();
        if absorbed == 0 {
            return Ok(0);
        }

        let mut merged = Vec::with_capacity(entries.len() + absorbed);
        let mut own = entries.drain(..).peekable();
        let mut other = foreign.into_iter().peekable();
        loop {
            let take_own = match (own.peek(), other.peek()) {
                (Some(a), Some(b)) => a.enqueued_at <= b.enqueued_at,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let next = if take_own { own.next() } else { other.next() };
            merged.extend(next);
        }
        drop(own);

        let shed = shed_overflow(&mut merged, self.capacity, self.policy);
        if shed > 0 {
            warn!(
                "event=outbox_overflow module=outbox status=shed phase=adopt policy={} dropped={} capacity={}",
                self.policy.as_str(),
                shed,
                self.capacity
            );
        }
        *entries = merged;
        persist(self.store.as_ref(), &self.key, &entries)?;
        Ok(absorbed)
    }

    fn persist_or_log(&self, entries: &[QueuedEvent], op: &str) {
        match persist(self.store.as_ref(), &self.key, entries) {
            Ok(()) => debug!(
                "event=outbox_persist module=outbox status=ok op={} len={}",
                op,
                entries.len()
            ),
            Err(err) => warn!(
                "event=outbox_persist module=outbox status=error op={} len={} error_code=storage_write_failed error={}",
                op,
                entries.len(),
                err
            ),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<QueuedEvent>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn namespace_key(namespace: &str) -> String {
    format!("{OUTBOX_KEY_PREFIX}{namespace}")
}

/// Reads and decodes one persisted queue, failing safe on any fault.
pub(crate) fn read_list(store: &dyn KeyValueStore, key: &str) -> Vec<QueuedEvent> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(err) => {
            warn!(
                "event=outbox_read module=outbox status=error error_code=storage_read_failed error={}",
                err
            );
            return Vec::new();
        }
    };

    let items = match serde_json::from_str::<Vec<Value>>(&raw) {
        Ok(items) => items,
        Err(_) => {
            warn!(
                "event=outbox_read module=outbox status=error error_code=corrupt_queue bytes={}",
                raw.len()
            );
            return Vec::new();
        }
    };

    let total = items.len();
    let events: Vec<QueuedEvent> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if events.len() < total {
        warn!(
            "event=outbox_read module=outbox status=partial error_code=corrupt_entries skipped={}",
            total - events.len()
        );
    }
    events
}

fn persist(store: &dyn KeyValueStore, key: &str, entries: &[QueuedEvent]) -> StorageResult<()> {
    // Plain data structs; serialization does not fail in practice.
    let raw = serde_json::to_string(entries).unwrap_or_else(|_| "[]".to_string());
    store.set(key, &raw)
}

fn shed_overflow(entries: &mut Vec<QueuedEvent>, capacity: usize, policy: OverflowPolicy) -> usize {
    let excess = entries.len().saturating_sub(capacity);
    if excess > 0 {
        match policy {
            OverflowPolicy::DropOldest => {
                entries.drain(..excess);
            }
            OverflowPolicy::DropNewest => entries.truncate(capacity),
        }
    }
    excess
}

#[cfg(test)]
mod tests {
    use super::{shed_overflow, DurableQueue, OverflowPolicy};
    use crate::model::event::{EventBody, EventKind, QueuedEvent};
    use crate::storage::kv::{KeyValueStore, MemoryKvStore};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn event_at(subject: &str, second: u32) -> QueuedEvent {
        QueuedEvent::at(
            EventBody::new(EventKind::View, subject),
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, second).unwrap(),
        )
    }

    fn subjects(events: &[QueuedEvent]) -> Vec<String> {
        events.iter().map(|e| e.body.subject_id.clone()).collect()
    }

    #[test]
    fn shed_overflow_respects_direction() {
        let mut oldest = vec![event_at("a", 0), event_at("b", 1), event_at("c", 2)];
        assert_eq!(shed_overflow(&mut oldest, 2, OverflowPolicy::DropOldest), 1);
        assert_eq!(subjects(&oldest), ["b", "c"]);

        let mut newest = vec![event_at("a", 0), event_at("b", 1), event_at("c", 2)];
        assert_eq!(shed_overflow(&mut newest, 2, OverflowPolicy::DropNewest), 1);
        assert_eq!(subjects(&newest), ["a", "b"]);
    }

    #[test]
    fn absorb_interleaves_by_time_and_skips_duplicates() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let queue = DurableQueue::open(store, "ctx", 10, OverflowPolicy::DropOldest);
        let a = event_at("a", 0);
        let c = event_at("c", 2);
        queue.enqueue(a.clone());
        queue.enqueue(c);

        let absorbed = queue
            .absorb(vec![event_at("b", 1), a, event_at("d", 3)])
            .expect("absorb should persist");

        assert_eq!(absorbed, 2);
        assert_eq!(subjects(&queue.snapshot()), ["a", "b", "c", "d"]);
        assert_eq!(subjects(&queue.read_all()), ["a", "b", "c", "d"]);
    }

    #[test]
    fn open_truncates_oversized_persisted_list() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let writer = DurableQueue::open(store.clone(), "ctx", 5, OverflowPolicy::DropOldest);
        for (i, subject) in ["a", "b", "c", "d"].iter().enumerate() {
            writer.enqueue(event_at(subject, i as u32));
        }

        let reader = DurableQueue::open(store, "ctx", 2, OverflowPolicy::DropOldest);
        assert_eq!(subjects(&reader.snapshot()), ["c", "d"]);
    }
}
