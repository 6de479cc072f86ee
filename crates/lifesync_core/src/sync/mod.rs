//! Entity sync: pull, merge, push.
//!
//! # Responsibility
//! - Reconcile local entity snapshots with the server copy of one owner.
//! - Resolve conflicts by last-write-wins on `updated_at`.
//!
//! # Invariants
//! - One entity's failure never aborts its siblings.
//! - Only one sync cycle runs at a time per orchestrator.

pub mod merge;
pub mod orchestrator;
