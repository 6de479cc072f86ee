//! Client-local key-value storage.
//!
//! # Responsibility
//! - Provide the durable string store the outbox and consent gate persist to.
//! - Keep SQLite details out of queue and gate logic.
//!
//! # Invariants
//! - Values are opaque strings; callers own their serialization format.
//! - Storage errors are surfaced here; callers decide whether to swallow them.

pub mod kv;
