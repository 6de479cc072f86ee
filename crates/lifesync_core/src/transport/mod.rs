//! Network boundary for progress events and card sync.
//!
//! # Responsibility
//! - Define the server contracts (`ProgressApi`, `CardApi`) the core drives.
//! - Classify failures into terminal and retryable outcomes.
//! - Provide the blocking HTTP implementation.
//!
//! # Invariants
//! - A 2xx response is the only success signal.
//! - 4xx (except 408/429) is terminal; everything else is retryable.

pub mod api;
pub mod error;
pub mod http;
