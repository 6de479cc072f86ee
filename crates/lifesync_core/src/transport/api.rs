//! Server contracts and wire types.

use crate::model::entity::{EntityKind, OwnerKey, SyncedEntity};
use crate::model::event::QueuedEvent;
use crate::transport::error::SubmitResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Progress endpoints used by the outbox.
pub trait ProgressApi: Send + Sync {
    /// Records one event; `Ok` only on a 2xx acknowledgment.
    fn record_event(&self, event: &QueuedEvent) -> SubmitResult<()>;

    /// Best-effort transmission during teardown. Never reports an outcome.
    fn send_beacon(&self, event: &QueuedEvent);

    fn set_consent(&self, enabled: bool) -> SubmitResult<()>;
}

/// Card endpoints used by the sync orchestrator.
pub trait CardApi {
    fn pull(&self, owner_key: &OwnerKey) -> SubmitResult<CardPullResponse>;
    fn push(&self, request: &CardSyncRequest) -> SubmitResult<CardSyncResponse>;
}

impl<T: CardApi + ?Sized> CardApi for &T {
    fn pull(&self, owner_key: &OwnerKey) -> SubmitResult<CardPullResponse> {
        (**self).pull(owner_key)
    }

    fn push(&self, request: &CardSyncRequest) -> SubmitResult<CardSyncResponse> {
        (**self).push(request)
    }
}

/// Body of `POST /progress/consent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRequest {
    pub enabled: bool,
}

/// One entity as pushed to `POST /card/sync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPayload {
    pub id: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_data: Option<Value>,
    pub updated_at: DateTime<Utc>,
}

impl From<&SyncedEntity> for EntityPayload {
    fn from(entity: &SyncedEntity) -> Self {
        Self {
            id: entity.id.clone(),
            data: entity.data.clone(),
            template_data: match entity.kind {
                EntityKind::Profile => entity.template_data.clone(),
                EntityKind::Contact => None,
            },
            updated_at: entity.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSyncRequest {
    pub owner_key: OwnerKey,
    pub profiles: Vec<EntityPayload>,
    pub contacts: Vec<EntityPayload>,
}

impl CardSyncRequest {
    pub fn new(owner_key: OwnerKey) -> Self {
        Self {
            owner_key,
            profiles: Vec::new(),
            contacts: Vec::new(),
        }
    }

    pub fn push_entity(&mut self, entity: &SyncedEntity) {
        let payload = EntityPayload::from(entity);
        match entity.kind {
            EntityKind::Profile => self.profiles.push(payload),
            EntityKind::Contact => self.contacts.push(payload),
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len() + self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-item outcome reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItemResult {
    pub success: bool,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSyncResponse {
    #[serde(default)]
    pub profiles: Vec<SyncItemResult>,
    #[serde(default)]
    pub contacts: Vec<SyncItemResult>,
    #[serde(default)]
    pub synced: u32,
    #[serde(default)]
    pub failed: u32,
}

impl CardSyncResponse {
    pub fn results_for(&self, kind: EntityKind) -> &[SyncItemResult] {
        match kind {
            EntityKind::Profile => &self.profiles,
            EntityKind::Contact => &self.contacts,
        }
    }
}

/// Server copy of one entity as returned by `GET /card/pull`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntity {
    pub id: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_data: Option<Value>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl RemoteEntity {
    pub fn into_entity(self, kind: EntityKind, owner_key: OwnerKey) -> SyncedEntity {
        SyncedEntity {
            kind,
            id: self.id,
            owner_key,
            data: self.data,
            template_data: self.template_data,
            version: self.version,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPullResponse {
    #[serde(default)]
    pub profiles: Vec<RemoteEntity>,
    #[serde(default)]
    pub contacts: Vec<RemoteEntity>,
}

impl CardPullResponse {
    /// Converts every remote record into a local entity for `owner_key`.
    pub fn into_entities(self, owner_key: &OwnerKey) -> Vec<SyncedEntity> {
        let profiles = self
            .profiles
            .into_iter()
            .map(|remote| remote.into_entity(EntityKind::Profile, owner_key.clone()));
        let contacts = self
            .contacts
            .into_iter()
            .map(|remote| remote.into_entity(EntityKind::Contact, owner_key.clone()));
        profiles.chain(contacts).collect()
    }
}
