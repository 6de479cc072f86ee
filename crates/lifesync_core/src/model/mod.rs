//! Domain model for progress events, consent and synced card entities.
//!
//! # Responsibility
//! - Define the records that flow through the outbox and the entity sync.
//! - Own the wire shape (`camelCase`) shared with the server.
//!
//! # Invariants
//! - Every queued event carries a stable `event_id` used as idempotency key.
//! - Every synced entity carries a genuine `updated_at`; nothing derives one.

pub mod consent;
pub mod entity;
pub mod event;
