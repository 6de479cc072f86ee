//! Entity snapshot store contract and SQLite implementation.
//!
//! # Responsibility
//! - Keep the latest local copy of every profile and contact.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Write paths call `SyncedEntity::validate()` before SQL mutations.
//! - Read paths reject corrupt rows instead of masking them. `scan_owner`
//!   reports them per row so one bad snapshot does not hide the rest.
//! - `(kind, id)` identifies one snapshot; the owner key is an attribute.

use crate::db::DbError;
use crate::model::entity::{EntityKind, EntityValidationError, OwnerKey, SyncedEntity};
use chrono::{DateTime, SecondsFormat, Utc};
use log::warn;
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const ENTITY_SELECT_SQL: &str = "SELECT
    kind,
    id,
    owner_key,
    data,
    template_data,
    version,
    updated_at
FROM entity_snapshots";

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Validation(EntityValidationError),
    Db(DbError),
    NotFound { kind: EntityKind, id: String },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{} not found: {id}", kind.as_str()),
            Self::InvalidData(message) => write!(f, "invalid persisted entity data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<EntityValidationError> for RepoError {
    fn from(value: EntityValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// A snapshot row that exists but cannot be decoded.
#[derive(Debug)]
pub struct UnreadableSnapshot {
    pub kind: EntityKind,
    pub id: String,
    pub error: RepoError,
}

/// Outcome of reading one row in `scan_owner`.
pub type SnapshotRead = Result<SyncedEntity, UnreadableSnapshot>;

/// Local snapshot storage for synced entities.
pub trait EntitySnapshotStore {
    /// Inserts or replaces the snapshot for `(entity.kind, entity.id)`.
    fn upsert(&self, entity: &SyncedEntity) -> RepoResult<()>;
    fn get(&self, kind: EntityKind, id: &str) -> RepoResult<Option<SyncedEntity>>;
    /// Lists snapshots of one owner ordered by kind, then id.
    fn list_by_owner(
        &self,
        owner_key: &OwnerKey,
        kind: Option<EntityKind>,
    ) -> RepoResult<Vec<SyncedEntity>>;
    /// Like `list_by_owner`, but a corrupt row yields an `Err` entry for that
    /// row instead of failing the whole read.
    fn scan_owner(&self, owner_key: &OwnerKey) -> RepoResult<Vec<SnapshotRead>>;
    /// Records the server-assigned version after an accepted push.
    fn set_version(&self, kind: EntityKind, id: &str, version: i64) -> RepoResult<()>;
    /// Moves every snapshot of `from` to `to`. Returns the moved count.
    fn reassign_owner(&self, from: &OwnerKey, to: &OwnerKey) -> RepoResult<usize>;
    fn delete(&self, kind: EntityKind, id: &str) -> RepoResult<()>;
}

/// SQLite-backed entity snapshot store.
pub struct SqliteEntityStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEntityStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl EntitySnapshotStore for SqliteEntityStore<'_> {
    fn upsert(&self, entity: &SyncedEntity) -> RepoResult<()> {
        entity.validate()?;

        self.conn.execute(
            "INSERT INTO entity_snapshots (
                kind,
                id,
                owner_key,
                data,
                template_data,
                version,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(kind, id) DO UPDATE SET
                owner_key = excluded.owner_key,
                data = excluded.data,
                template_data = excluded.template_data,
                version = excluded.version,
                updated_at = excluded.updated_at;",
            params![
                entity.kind.as_str(),
                entity.id.as_str(),
                entity.owner_key.to_string(),
                entity.data.to_string(),
                entity.template_data.as_ref().map(|value| value.to_string()),
                entity.version,
                timestamp_to_db(&entity.updated_at),
            ],
        )?;

        Ok(())
    }

    fn get(&self, kind: EntityKind, id: &str) -> RepoResult<Option<SyncedEntity>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ENTITY_SELECT_SQL}
             WHERE kind = ?1 AND id = ?2;"
        ))?;

        let mut rows = stmt.query(params![kind.as_str(), id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_entity_row(row)?));
        }

        Ok(None)
    }

    fn list_by_owner(
        &self,
        owner_key: &OwnerKey,
        kind: Option<EntityKind>,
    ) -> RepoResult<Vec<SyncedEntity>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ENTITY_SELECT_SQL}
             WHERE owner_key = ?1
               AND (?2 IS NULL OR kind = ?2)
             ORDER BY kind ASC, id ASC;"
        ))?;

        let mut rows = stmt.query(params![
            owner_key.to_string(),
            kind.map(EntityKind::as_str)
        ])?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            entities.push(parse_entity_row(row)?);
        }

        Ok(entities)
    }

    fn scan_owner(&self, owner_key: &OwnerKey) -> RepoResult<Vec<SnapshotRead>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ENTITY_SELECT_SQL}
             WHERE owner_key = ?1
             ORDER BY kind ASC, id ASC;"
        ))?;

        let mut rows = stmt.query(params![owner_key.to_string()])?;
        let mut reads = Vec::new();
        while let Some(row) = rows.next()? {
            let kind_text: String = row.get("kind")?;
            let id: String = row.get("id")?;
            let Some(kind) = EntityKind::parse(&kind_text) else {
                warn!(
                    "event=entity_scan module=repo status=skipped reason=unknown_kind id={}",
                    id
                );
                continue;
            };
            reads.push(
                parse_entity_row(row).map_err(|error| UnreadableSnapshot { kind, id, error }),
            );
        }

        Ok(reads)
    }

    fn set_version(&self, kind: EntityKind, id: &str, version: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE entity_snapshots SET version = ?1 WHERE kind = ?2 AND id = ?3;",
            params![version, kind.as_str(), id],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                kind,
                id: id.to_string(),
            });
        }

        Ok(())
    }

    fn reassign_owner(&self, from: &OwnerKey, to: &OwnerKey) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE entity_snapshots SET owner_key = ?1 WHERE owner_key = ?2;",
            params![to.to_string(), from.to_string()],
        )?;
        Ok(changed)
    }

    fn delete(&self, kind: EntityKind, id: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM entity_snapshots WHERE kind = ?1 AND id = ?2;",
            params![kind.as_str(), id],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                kind,
                id: id.to_string(),
            });
        }

        Ok(())
    }
}

fn parse_entity_row(row: &Row<'_>) -> RepoResult<SyncedEntity> {
    let kind_text: String = row.get("kind")?;
    let kind = EntityKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid kind `{kind_text}` in entity_snapshots.kind"
        ))
    })?;

    let id: String = row.get("id")?;

    let owner_text: String = row.get("owner_key")?;
    let owner_key = owner_text.parse::<OwnerKey>().map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid owner key `{owner_text}` for {} {id}",
            kind.as_str()
        ))
    })?;

    let data_text: String = row.get("data")?;
    let data = serde_json::from_str(&data_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid json in entity_snapshots.data for {id}"))
    })?;

    let template_data = match row.get::<_, Option<String>>("template_data")? {
        Some(text) => Some(serde_json::from_str(&text).map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid json in entity_snapshots.template_data for {id}"
            ))
        })?),
        None => None,
    };

    let updated_text: String = row.get("updated_at")?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_text)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid timestamp `{updated_text}` in entity_snapshots.updated_at for {id}"
            ))
        })?;

    let entity = SyncedEntity {
        kind,
        id,
        owner_key,
        data,
        template_data,
        version: row.get("version")?,
        updated_at,
    };
    entity.validate()?;
    Ok(entity)
}

fn timestamp_to_db(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
