//! Namespace leases and orphan adoption across client contexts.
//!
//! Each context owns `outbox:v1:<context_id>` while its lease key
//! `outbox_lease:v1:<context_id>` holds an expiry in the future. A context
//! that crashed, or released its lease on teardown, leaves a namespace that
//! the next flushing context adopts.
//!
//! # Invariants
//! - A context never writes another live context's namespace.
//! - A foreign namespace is removed only after its events were persisted
//!   into the adopting queue.

use crate::outbox::queue::{read_list, DurableQueue, OUTBOX_KEY_PREFIX};
use crate::storage::kv::KeyValueStore;
use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;

pub const LEASE_KEY_PREFIX: &str = "outbox_lease:v1:";

/// Lease held by one context over its queue namespace.
pub struct ContextLease {
    store: Arc<dyn KeyValueStore>,
    context_id: String,
    ttl_ms: i64,
}

impl ContextLease {
    pub fn new(store: Arc<dyn KeyValueStore>, context_id: impl Into<String>, ttl_ms: u64) -> Self {
        Self {
            store,
            context_id: context_id.into(),
            ttl_ms: i64::try_from(ttl_ms).unwrap_or(i64::MAX),
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Extends the lease to `now + ttl`. Storage faults are logged only.
    pub fn refresh(&self) {
        let expires_at = now_ms().saturating_add(self.ttl_ms);
        self.write(expires_at, "refresh");
    }

    /// Marks the namespace as free for adoption.
    pub fn release(&self) {
        self.write(0, "release");
    }

    /// Moves every orphaned namespace into `queue`. Returns adopted events.
    pub fn adopt_orphans(&self, queue: &DurableQueue) -> usize {
        let keys = match self.store.keys_with_prefix(OUTBOX_KEY_PREFIX) {
            Ok(keys) => keys,
            Err(err) => {
                warn!(
                    "event=outbox_adopt module=outbox status=error error_code=storage_scan_failed error={}",
                    err
                );
                return 0;
            }
        };

        let now = now_ms();
        let mut adopted = 0;
        for key in keys {
            let Some(owner) = key.strip_prefix(OUTBOX_KEY_PREFIX) else {
                continue;
            };
            if owner == self.context_id || key == queue.key() || self.is_live(owner, now) {
                continue;
            }

            let foreign = read_list(self.store.as_ref(), &key);
            let count = foreign.len();
            match queue.absorb(foreign) {
                Ok(absorbed) => {
                    self.forget(owner, &key);
                    adopted += absorbed;
                    info!(
                        "event=outbox_adopt module=outbox status=ok from_context={} found={} absorbed={}",
                        owner, count, absorbed
                    );
                }
                Err(err) => warn!(
                    "event=outbox_adopt module=outbox status=error from_context={} error_code=storage_write_failed error={}",
                    owner, err
                ),
            }
        }
        self.sweep_stale_leases(now);
        adopted
    }

    fn is_live(&self, owner: &str, now: i64) -> bool {
        match self.store.get(&lease_key(owner)) {
            Ok(Some(raw)) => raw.trim().parse::<i64>().is_ok_and(|expires_at| expires_at > now),
            Ok(None) => false,
            // Unknown liveness: leave the namespace alone this round.
            Err(_) => true,
        }
    }

    fn forget(&self, owner: &str, queue_key: &str) {
        for key in [queue_key.to_string(), lease_key(owner)] {
            if let Err(err) = self.store.remove(&key) {
                warn!(
                    "event=outbox_adopt module=outbox status=error from_context={} error_code=storage_remove_failed error={}",
                    owner, err
                );
            }
        }
    }

    fn sweep_stale_leases(&self, now: i64) {
        let Ok(keys) = self.store.keys_with_prefix(LEASE_KEY_PREFIX) else {
            return;
        };
        for key in keys {
            let Some(owner) = key.strip_prefix(LEASE_KEY_PREFIX) else {
                continue;
            };
            if owner == self.context_id || self.is_live(owner, now) {
                continue;
            }
            let has_queue = matches!(
                self.store.get(&format!("{OUTBOX_KEY_PREFIX}{owner}")),
                Ok(Some(_))
            );
            if !has_queue {
                let _ = self.store.remove(&key);
            }
        }
    }

    fn write(&self, expires_at: i64, op: &str) {
        if let Err(err) = self
            .store
            .set(&lease_key(&self.context_id), &expires_at.to_string())
        {
            warn!(
                "event=outbox_lease module=outbox status=error op={} context={} error_code=storage_write_failed error={}",
                op, self.context_id, err
            );
        }
    }
}

/// Pending-event count per namespace, for diagnostics.
pub fn namespace_depths(store: &dyn KeyValueStore) -> Vec<(String, usize)> {
    store
        .keys_with_prefix(OUTBOX_KEY_PREFIX)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|key| {
            let owner = key.strip_prefix(OUTBOX_KEY_PREFIX)?.to_string();
            Some((owner, read_list(store, &key).len()))
        })
        .collect()
}

fn lease_key(context_id: &str) -> String {
    format!("{LEASE_KEY_PREFIX}{context_id}")
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::{namespace_depths, ContextLease};
    use crate::model::event::{EventBody, EventKind, QueuedEvent};
    use crate::outbox::queue::{DurableQueue, OverflowPolicy};
    use crate::storage::kv::{KeyValueStore, MemoryKvStore};
    use std::sync::Arc;

    fn queue_for(store: &Arc<dyn KeyValueStore>, ctx: &str) -> DurableQueue {
        DurableQueue::open(store.clone(), ctx, 50, OverflowPolicy::DropOldest)
    }

    #[test]
    fn live_namespace_is_not_adopted() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let other = queue_for(&store, "tab-a");
        other.enqueue(QueuedEvent::new(EventBody::new(EventKind::View, "s1")));
        ContextLease::new(store.clone(), "tab-a", 60_000).refresh();

        let mine = queue_for(&store, "tab-b");
        let adopted = ContextLease::new(store.clone(), "tab-b", 60_000).adopt_orphans(&mine);

        assert_eq!(adopted, 0);
        assert!(mine.is_empty());
        assert_eq!(other.read_all().len(), 1);
    }

    #[test]
    fn released_namespace_is_adopted_and_removed() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let other = queue_for(&store, "tab-a");
        other.enqueue(QueuedEvent::new(EventBody::new(EventKind::View, "s1")));
        other.enqueue(QueuedEvent::new(EventBody::new(EventKind::Start, "s1")));
        let other_lease = ContextLease::new(store.clone(), "tab-a", 60_000);
        other_lease.refresh();
        other_lease.release();

        let mine = queue_for(&store, "tab-b");
        let adopted = ContextLease::new(store.clone(), "tab-b", 60_000).adopt_orphans(&mine);

        assert_eq!(adopted, 2);
        assert_eq!(mine.len(), 2);
        assert_eq!(
            store.get("outbox:v1:tab-a").expect("get should succeed"),
            None
        );
        assert_eq!(
            store.get("outbox_lease:v1:tab-a").expect("get should succeed"),
            None
        );
    }

    #[test]
    fn namespace_without_lease_counts_as_orphan() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        queue_for(&store, "crashed").enqueue(QueuedEvent::new(EventBody::new(
            EventKind::Complete,
            "s9",
        )));

        let mine = queue_for(&store, "tab-b");
        ContextLease::new(store.clone(), "tab-b", 60_000).adopt_orphans(&mine);

        assert_eq!(mine.len(), 1);
        assert_eq!(namespace_depths(store.as_ref()), vec![("tab-b".to_string(), 1)]);
    }
}
