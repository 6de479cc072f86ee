//! Progress tracking entry point.
//!
//! # Responsibility
//! - Apply the consent gate at the moment an event is created.
//! - Try an immediate delivery, falling back to the durable queue.
//!
//! # Invariants
//! - While consent is declined nothing is sent and nothing is queued.
//! - A new event never overtakes events already waiting in the queue,
//!   including ones left behind by contexts that detached or crashed.

use crate::model::event::{EventBody, EventValidationError, QueuedEvent};
use crate::outbox::consent::ConsentGate;
use crate::outbox::notifier::{DeliveryNotice, DeliveryNotifier};
use crate::outbox::queue::{DurableQueue, EnqueueOutcome};
use crate::outbox::scheduler::FlushScheduler;
use crate::transport::api::ProgressApi;
use crate::transport::error::SubmitError;
use log::{debug, warn};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// Acknowledged by the server on the first attempt.
    Delivered,
    /// Waiting in the durable queue for a later flush.
    Queued(EnqueueOutcome),
    /// Refused by the server as invalid; not queued.
    Rejected(SubmitError),
    /// Consent is declined; the event was discarded at creation.
    DroppedNoConsent,
    Invalid(EventValidationError),
}

pub struct ProgressTracker {
    api: Arc<dyn ProgressApi>,
    queue: Arc<DurableQueue>,
    notifier: Arc<dyn DeliveryNotifier>,
    consent: Arc<ConsentGate>,
    scheduler: Arc<FlushScheduler>,
}

impl ProgressTracker {
    pub fn new(
        api: Arc<dyn ProgressApi>,
        queue: Arc<DurableQueue>,
        notifier: Arc<dyn DeliveryNotifier>,
        consent: Arc<ConsentGate>,
        scheduler: Arc<FlushScheduler>,
    ) -> Self {
        Self {
            api,
            queue,
            notifier,
            consent,
            scheduler,
        }
    }

    /// Records one progress event for the subject named in `body`.
    pub fn track(&self, body: EventBody) -> TrackOutcome {
        if let Err(err) = body.validate() {
            warn!(
                "event=progress_track module=service status=invalid error={}",
                err
            );
            return TrackOutcome::Invalid(err);
        }
        if !self.consent.allows_delivery() {
            debug!(
                "event=progress_track module=service status=dropped reason=consent_declined type={}",
                body.kind.as_str()
            );
            return TrackOutcome::DroppedNoConsent;
        }

        // Pull in orphaned namespaces first so their older events count as
        // pending below.
        self.scheduler.claim_pending();
        let event = QueuedEvent::new(body);

        // Earlier events are still pending: join the line and let the
        // scheduler deliver in order.
        if !self.queue.is_empty() {
            let outcome = self.queue.enqueue(event);
            self.scheduler.flush();
            return TrackOutcome::Queued(outcome);
        }

        match self.api.record_event(&event) {
            Ok(()) => {
                self.notifier.publish(&DeliveryNotice::delivered(&event));
                TrackOutcome::Delivered
            }
            Err(error) if !error.is_retryable() => {
                warn!(
                    "event=progress_track module=service status=rejected event_id={} error_code={}",
                    event.event_id,
                    error.code()
                );
                TrackOutcome::Rejected(error)
            }
            Err(error) => {
                debug!(
                    "event=progress_track module=service status=queued event_id={} error_code={}",
                    event.event_id,
                    error.code()
                );
                TrackOutcome::Queued(self.queue.enqueue(event))
            }
        }
    }
}
