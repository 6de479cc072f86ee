//! Use-case services wiring the outbox for UI-facing callers.
//!
//! # Responsibility
//! - Offer one entry point per client context for tracking and lifecycle.
//! - Keep UI code unaware of queue, lease and transport details.

pub mod client_context;
pub mod progress_service;
