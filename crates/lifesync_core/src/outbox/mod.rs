//! Durable progress-event outbox.
//!
//! # Responsibility
//! - Persist not-yet-acknowledged events per client context.
//! - Decide when to deliver them and in which order.
//! - Gate every delivery on the user's consent.
//! - Tell other contexts about successful deliveries.
//!
//! # Invariants
//! - Events leave a queue only after a 2xx or a terminal rejection.
//! - A retryable failure stops the flush; later events never overtake it.
//! - Each context writes only its own namespace; orphaned namespaces are
//!   adopted at flush time.

pub mod consent;
pub mod lease;
pub mod notifier;
pub mod queue;
pub mod scheduler;
