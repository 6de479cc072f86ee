//! Repository layer for locally persisted sync entities.
//!
//! # Responsibility
//! - Define snapshot storage contracts used by the sync orchestrator.
//! - Isolate SQLite query details from merge and push logic.
//!
//! # Invariants
//! - Repository writes enforce `SyncedEntity::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod entity_repo;
