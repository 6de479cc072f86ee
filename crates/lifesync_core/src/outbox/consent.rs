//! Consent gate in front of every progress delivery.
//!
//! # Responsibility
//! - Persist the user's tri-state consent decision.
//! - Short-circuit tracking and flushing while consent is declined.
//!
//! # Invariants
//! - `Declined` drops events at creation; nothing is queued while declined.
//! - `Enabled` is stored only after the server confirmed it.
//! - Events enqueued before the most recent decline are never delivered,
//!   even if consent is enabled again later.

use crate::model::consent::ConsentState;
use crate::outbox::queue::{DurableQueue, OUTBOX_KEY_PREFIX};
use crate::storage::kv::KeyValueStore;
use crate::transport::api::ProgressApi;
use crate::transport::error::SubmitResult;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

pub const CONSENT_KEY: &str = "consent:v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsentRecord {
    state: ConsentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    declined_at: Option<DateTime<Utc>>,
}

impl Default for ConsentRecord {
    fn default() -> Self {
        Self {
            state: ConsentState::Unset,
            declined_at: None,
        }
    }
}

pub struct ConsentGate {
    store: Arc<dyn KeyValueStore>,
    cached: Mutex<ConsentRecord>,
}

impl ConsentGate {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let gate = Self {
            store,
            cached: Mutex::new(ConsentRecord::default()),
        };
        gate.load();
        gate
    }

    /// Current state, re-read from storage so decisions made in another
    /// context apply here too. Falls back to the last known value.
    pub fn state(&self) -> ConsentState {
        self.load().state
    }

    pub fn allows_delivery(&self) -> bool {
        self.state().allows_delivery()
    }

    /// Time of the most recent decline, if any.
    pub fn declined_at(&self) -> Option<DateTime<Utc>> {
        self.load().declined_at
    }

    /// Enables delivery after the server confirmed it.
    ///
    /// On failure the stored state is left unchanged.
    pub fn enable(&self, api: &dyn ProgressApi) -> SubmitResult<ConsentState> {
        let previous = self.state();
        if let Err(err) = api.set_consent(true) {
            warn!(
                "event=consent_change module=outbox status=error from={} to=enabled error_code={}",
                previous.as_str(),
                err.code()
            );
            return Err(err);
        }
        let record = ConsentRecord {
            state: ConsentState::Enabled,
            declined_at: self.load().declined_at,
        };
        self.store_record(record);
        info!(
            "event=consent_change module=outbox status=ok from={} to=enabled",
            previous.as_str()
        );
        Ok(ConsentState::Enabled)
    }

    /// Declines delivery immediately and discards pending events.
    ///
    /// Purges `queue` and every other persisted namespace, then tells the
    /// server best-effort. Already delivered events are not recalled.
    pub fn decline(&self, api: &dyn ProgressApi, queue: &DurableQueue) -> ConsentState {
        let previous = self.state();
        self.store_record(ConsentRecord {
            state: ConsentState::Declined,
            declined_at: Some(Utc::now()),
        });

        let mut purged = queue.purge();
        purged += self.purge_foreign_namespaces(queue.key());

        if let Err(err) = api.set_consent(false) {
            warn!(
                "event=consent_change module=outbox status=partial from={} to=declined error_code=server_not_told error={}",
                previous.as_str(),
                err
            );
        }
        info!(
            "event=consent_change module=outbox status=ok from={} to=declined purged={}",
            previous.as_str(),
            purged
        );
        ConsentState::Declined
    }

    fn purge_foreign_namespaces(&self, own_key: &str) -> usize {
        let keys = self
            .store
            .keys_with_prefix(OUTBOX_KEY_PREFIX)
            .unwrap_or_default();
        let mut removed = 0;
        for key in keys.into_iter().filter(|key| key != own_key) {
            if self.store.remove(&key).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    fn load(&self) -> ConsentRecord {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        match self.store.get(CONSENT_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<ConsentRecord>(&raw) {
                Ok(record) => *cached = record,
                Err(_) => warn!(
                    "event=consent_read module=outbox status=error error_code=corrupt_consent fallback={}",
                    cached.state.as_str()
                ),
            },
            Ok(None) => {}
            Err(err) => warn!(
                "event=consent_read module=outbox status=error error_code=storage_read_failed fallback={} error={}",
                cached.state.as_str(),
                err
            ),
        }
        *cached
    }

    fn store_record(&self, record: ConsentRecord) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = record;
        let raw = serde_json::to_string(&record).unwrap_or_default();
        if let Err(err) = self.store.set(CONSENT_KEY, &raw) {
            warn!(
                "event=consent_write module=outbox status=error state={} error_code=storage_write_failed error={}",
                record.state.as_str(),
                err
            );
        }
    }
}
