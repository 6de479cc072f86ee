//! Pull → merge → push cycle for one owner key.
//!
//! # Responsibility
//! - Fetch the server copies, resolve each record, store remote winners
//!   locally and upsert the merged set back to the server.
//! - Report one outcome per entity.
//!
//! # Invariants
//! - A failed pull aborts the cycle before anything local changes.
//! - Local or per-item push failures are isolated to that entity.
//! - A local snapshot that cannot be decoded fails only its own key; the
//!   server copy of that key is neither merged nor pushed.
//! - Versions are only ever written from server responses.

use crate::model::entity::{EntityKind, OwnerKey, SyncedEntity};
use crate::repo::entity_repo::{
    EntitySnapshotStore, RepoError, RepoResult, UnreadableSnapshot,
};
use crate::single_flight::SingleFlight;
use crate::sync::merge::{resolve, MergeSource};
use crate::transport::api::{CardApi, CardSyncRequest, CardSyncResponse};
use crate::transport::error::SubmitError;
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

type EntityKey = (EntityKind, String);

/// Step of the cycle an entity failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Merge,
    Push,
    Persist,
}

impl SyncStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Push => "push",
            Self::Persist => "persist",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityOutcome {
    /// Accepted by the server; `version` is the server-assigned counter.
    Pushed { version: Option<i64> },
    Failed { stage: SyncStage, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySyncResult {
    pub kind: EntityKind,
    pub id: String,
    pub source: MergeSource,
    pub outcome: EntityOutcome,
}

impl EntitySyncResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, EntityOutcome::Pushed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub owner_key: OwnerKey,
    pub pulled: usize,
    pub results: Vec<EntitySyncResult>,
}

impl SyncReport {
    pub fn synced(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.synced()
    }

    pub fn result_for(&self, kind: EntityKind, id: &str) -> Option<&EntitySyncResult> {
        self.results.iter().find(|r| r.kind == kind && r.id == id)
    }
}

/// Cycle-level failure; per-entity failures live in `SyncReport`.
#[derive(Debug)]
pub enum SyncError {
    InFlight,
    Pull(SubmitError),
    LocalRead(RepoError),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InFlight => write!(f, "a sync cycle is already running"),
            Self::Pull(err) => write!(f, "pull failed: {err}"),
            Self::LocalRead(err) => write!(f, "reading local snapshots failed: {err}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InFlight => None,
            Self::Pull(err) => Some(err),
            Self::LocalRead(err) => Some(err),
        }
    }
}

pub struct SyncOrchestrator<S: EntitySnapshotStore, A: CardApi> {
    store: S,
    api: A,
    flight: SingleFlight,
}

impl<S: EntitySnapshotStore, A: CardApi> SyncOrchestrator<S, A> {
    pub fn new(store: S, api: A) -> Self {
        Self {
            store,
            api,
            flight: SingleFlight::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one full cycle for `owner_key`.
    pub fn run(&self, owner_key: &OwnerKey) -> Result<SyncReport, SyncError> {
        let Some(_flight) = self.flight.try_acquire() else {
            return Err(SyncError::InFlight);
        };
        let started_at = Instant::now();

        let remote = self.api.pull(owner_key).map_err(|err| {
            warn!(
                "event=entity_sync module=sync status=error stage=pull error_code={}",
                err.code()
            );
            SyncError::Pull(err)
        })?;
        let remote = index(remote.into_entities(owner_key));
        let pulled = remote.len();
        let mut local = BTreeMap::new();
        let mut unreadable = BTreeMap::new();
        for read in self
            .store
            .scan_owner(owner_key)
            .map_err(SyncError::LocalRead)?
        {
            match read {
                Ok(entity) => {
                    local.insert((entity.kind, entity.id.clone()), entity);
                }
                Err(snapshot) => {
                    unreadable.insert((snapshot.kind, snapshot.id.clone()), snapshot);
                }
            }
        }

        let keys: BTreeSet<&EntityKey> = local.keys().chain(remote.keys()).collect();
        let mut results: Vec<EntitySyncResult> =
            unreadable.values().map(unreadable_result).collect();
        let mut to_push: Vec<(SyncedEntity, MergeSource)> = Vec::new();

        for key in keys {
            if unreadable.contains_key(key) {
                continue;
            }
            let outcome = resolve(local.get(key), remote.get(key));
            let Some(winner) = outcome.winner else {
                continue;
            };
            if outcome.source == MergeSource::Remote {
                if let Err(err) = self.store.upsert(&winner) {
                    results.push(failed(&winner, outcome.source, SyncStage::Merge, &err));
                    continue;
                }
            }
            to_push.push((winner, outcome.source));
        }

        results.extend(self.push(owner_key, to_push));

        let report = SyncReport {
            owner_key: owner_key.clone(),
            pulled,
            results,
        };
        info!(
            "event=entity_sync module=sync status={} pulled={} synced={} failed={} duration_ms={}",
            if report.failed() == 0 { "ok" } else { "partial" },
            report.pulled,
            report.synced(),
            report.failed(),
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    /// Moves anonymous device records to the signed-in account.
    pub fn adopt_device_records(
        &self,
        device: &OwnerKey,
        account: &OwnerKey,
    ) -> RepoResult<usize> {
        let moved = self.store.reassign_owner(device, account)?;
        info!(
            "event=entity_owner_reassign module=sync status=ok moved={}",
            moved
        );
        Ok(moved)
    }

    fn push(
        &self,
        owner_key: &OwnerKey,
        merged: Vec<(SyncedEntity, MergeSource)>,
    ) -> Vec<EntitySyncResult> {
        if merged.is_empty() {
            return Vec::new();
        }

        let mut request = CardSyncRequest::new(owner_key.clone());
        for (entity, _) in &merged {
            request.push_entity(entity);
        }

        let response = match self.api.push(&request) {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    "event=entity_sync module=sync status=error stage=push error_code={} items={}",
                    err.code(),
                    merged.len()
                );
                return merged
                    .iter()
                    .map(|(entity, source)| failed(entity, *source, SyncStage::Push, &err))
                    .collect();
            }
        };

        merged
            .iter()
            .map(|(entity, source)| self.settle(entity, *source, &response))
            .collect()
    }

    fn settle(
        &self,
        entity: &SyncedEntity,
        source: MergeSource,
        response: &CardSyncResponse,
    ) -> EntitySyncResult {
        let item = response
            .results_for(entity.kind)
            .iter()
            .find(|item| item.id == entity.id);
        let Some(item) = item else {
            return failed(entity, source, SyncStage::Push, &"no result reported by server");
        };
        if !item.success {
            let error = item.error.as_deref().unwrap_or("rejected by server");
            return failed(entity, source, SyncStage::Push, &error);
        }

        if let Some(version) = item.version {
            if let Err(err) = self.store.set_version(entity.kind, &entity.id, version) {
                return failed(entity, source, SyncStage::Persist, &err);
            }
        }

        EntitySyncResult {
            kind: entity.kind,
            id: entity.id.clone(),
            source,
            outcome: EntityOutcome::Pushed {
                version: item.version,
            },
        }
    }
}

fn index(entities: Vec<SyncedEntity>) -> BTreeMap<EntityKey, SyncedEntity> {
    entities
        .into_iter()
        .map(|entity| ((entity.kind, entity.id.clone()), entity))
        .collect()
}

fn unreadable_result(snapshot: &UnreadableSnapshot) -> EntitySyncResult {
    warn!(
        "event=entity_sync_item module=sync status=error stage=merge kind={} id={} error_code=unreadable_snapshot",
        snapshot.kind.as_str(),
        snapshot.id
    );
    EntitySyncResult {
        kind: snapshot.kind,
        id: snapshot.id.clone(),
        source: MergeSource::Local,
        outcome: EntityOutcome::Failed {
            stage: SyncStage::Merge,
            error: snapshot.error.to_string(),
        },
    }
}

fn failed(
    entity: &SyncedEntity,
    source: MergeSource,
    stage: SyncStage,
    error: &dyn Display,
) -> EntitySyncResult {
    warn!(
        "event=entity_sync_item module=sync status=error stage={} kind={} id={}",
        stage.as_str(),
        entity.kind.as_str(),
        entity.id
    );
    EntitySyncResult {
        kind: entity.kind,
        id: entity.id.clone(),
        source,
        outcome: EntityOutcome::Failed {
            stage,
            error: error.to_string(),
        },
    }
}
