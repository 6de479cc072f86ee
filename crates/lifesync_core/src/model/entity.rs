//! Synced card entity model (profiles and contacts).
//!
//! # Responsibility
//! - Define the record reconciled between devices and the server.
//! - Define owner keys scoping which records a participant may touch.
//!
//! # Invariants
//! - `updated_at` is supplied at construction and on every edit.
//! - `version` is owned by the server; local edits never change it.
//! - `template_data` is only meaningful for profiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Record family stored and synced independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Profile,
    Contact,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Contact => "contact",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "profile" => Some(Self::Profile),
            "contact" => Some(Self::Contact),
            _ => None,
        }
    }
}

/// Anonymous device or authenticated account owning a set of entities.
///
/// Rendered as `device:<id>` or `account:<id>` on the wire and on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OwnerKey {
    Device(String),
    Account(String),
}

impl OwnerKey {
    pub fn device(id: impl Into<String>) -> Self {
        Self::Device(id.into())
    }

    pub fn account(id: impl Into<String>) -> Self {
        Self::Account(id.into())
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Device(_))
    }
}

impl Display for OwnerKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device(id) => write!(f, "device:{id}"),
            Self::Account(id) => write!(f, "account:{id}"),
        }
    }
}

impl FromStr for OwnerKey {
    type Err = EntityValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || EntityValidationError::InvalidOwnerKey(value.to_string());
        let (scheme, id) = value.split_once(':').ok_or_else(invalid)?;
        if id.trim().is_empty() || id.trim() != id {
            return Err(invalid());
        }
        match scheme {
            "device" => Ok(Self::Device(id.to_string())),
            "account" => Ok(Self::Account(id.to_string())),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for OwnerKey {
    type Error = EntityValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OwnerKey> for String {
    fn from(value: OwnerKey) -> Self {
        value.to_string()
    }
}

/// User-editable structured record reconciled by last-write-wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedEntity {
    pub kind: EntityKind,
    pub id: String,
    pub owner_key: OwnerKey,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_data: Option<Value>,
    /// 0 until the server has accepted the record once.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl SyncedEntity {
    /// Creates a never-synced record with a generated id.
    pub fn new(
        kind: EntityKind,
        owner_key: OwnerKey,
        data: Value,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), kind, owner_key, data, updated_at)
    }

    /// Creates a record with a caller-provided id (imports, remote copies).
    pub fn with_id(
        id: impl Into<String>,
        kind: EntityKind,
        owner_key: OwnerKey,
        data: Value,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            owner_key,
            data,
            template_data: None,
            version: 0,
            updated_at,
        }
    }

    /// Applies a local edit, replacing the payload and stamping the edit time.
    pub fn edit(&mut self, data: Value, edited_at: DateTime<Utc>) {
        self.data = data;
        self.updated_at = edited_at;
    }

    pub fn validate(&self) -> Result<(), EntityValidationError> {
        if self.id.trim().is_empty() {
            return Err(EntityValidationError::BlankId);
        }
        if self.version < 0 {
            return Err(EntityValidationError::NegativeVersion {
                id: self.id.clone(),
                version: self.version,
            });
        }
        if self.kind == EntityKind::Contact && self.template_data.is_some() {
            return Err(EntityValidationError::TemplateDataOnContact(self.id.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityValidationError {
    BlankId,
    InvalidOwnerKey(String),
    NegativeVersion { id: String, version: i64 },
    TemplateDataOnContact(String),
}

impl Display for EntityValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankId => write!(f, "entity id cannot be blank"),
            Self::InvalidOwnerKey(value) => {
                write!(f, "owner key must be `device:<id>` or `account:<id>`, got `{value}`")
            }
            Self::NegativeVersion { id, version } => {
                write!(f, "entity {id} has negative version {version}")
            }
            Self::TemplateDataOnContact(id) => {
                write!(f, "contact {id} cannot carry template data")
            }
        }
    }
}

impl Error for EntityValidationError {}
