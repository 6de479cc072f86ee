//! Flush triggers and the delivery loop.
//!
//! # Responsibility
//! - Turn lifecycle triggers into flush or teardown runs.
//! - Drain the queue head-first through the progress API.
//!
//! # Invariants
//! - Only one flush runs at a time per context (single-flight).
//! - A retryable failure stops the loop; the failed event and its
//!   successors stay queued in order.
//! - A terminal failure drops that event and the loop continues.
//! - Teardown hands beacons to a detached worker and keeps the events
//!   queued, except those older than the last consent decline, which it
//!   drops unsent.
//! - While consent is declined no network call is made.

use crate::outbox::consent::ConsentGate;
use crate::outbox::lease::ContextLease;
use crate::outbox::notifier::{DeliveryNotice, DeliveryNotifier};
use crate::model::event::QueuedEvent;
use crate::outbox::queue::DurableQueue;
use crate::single_flight::SingleFlight;
use crate::transport::api::ProgressApi;
use crate::transport::error::SubmitError;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Lifecycle signal that may warrant a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Fired once, after the startup delay.
    Startup,
    /// Connectivity came back.
    Online,
    /// The context became visible again.
    Foreground,
    /// The context is going away.
    Teardown,
}

impl FlushTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Online => "online",
            Self::Foreground => "foreground",
            Self::Teardown => "teardown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushStatus {
    /// Every pending event was settled.
    Drained,
    /// Stopped at a retryable failure; the rest waits for the next trigger.
    Stopped { error: SubmitError },
    /// Another flush was already running.
    Skipped,
    /// Consent is declined; nothing was sent.
    BlockedByConsent,
    /// Teardown beaconed `beaconed` events without removing them.
    TornDown { beaconed: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEvent {
    pub event_id: Uuid,
    pub error: SubmitError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub status: FlushStatus,
    /// Acknowledged ids in delivery order.
    pub delivered: Vec<Uuid>,
    /// Terminally rejected and dropped.
    pub rejected: Vec<RejectedEvent>,
    /// Events older than the last consent decline, discarded unsent.
    pub discarded: usize,
    /// Events taken over from orphaned namespaces before draining.
    pub adopted: usize,
    /// Queue length after the run.
    pub remaining: usize,
}

impl FlushReport {
    fn with_status(status: FlushStatus, remaining: usize) -> Self {
        Self {
            status,
            delivered: Vec::new(),
            rejected: Vec::new(),
            discarded: 0,
            adopted: 0,
            remaining,
        }
    }

    pub fn is_drained(&self) -> bool {
        self.status == FlushStatus::Drained
    }
}

pub struct FlushScheduler {
    queue: Arc<DurableQueue>,
    api: Arc<dyn ProgressApi>,
    notifier: Arc<dyn DeliveryNotifier>,
    consent: Arc<ConsentGate>,
    lease: Arc<ContextLease>,
    startup_delay: Duration,
    flight: SingleFlight,
    installed: AtomicBool,
    beacon_worker: Mutex<Option<JoinHandle<usize>>>,
}

impl FlushScheduler {
    pub fn new(
        queue: Arc<DurableQueue>,
        api: Arc<dyn ProgressApi>,
        notifier: Arc<dyn DeliveryNotifier>,
        consent: Arc<ConsentGate>,
        lease: Arc<ContextLease>,
        startup_delay: Duration,
    ) -> Self {
        Self {
            queue,
            api,
            notifier,
            consent,
            lease,
            startup_delay,
            flight: SingleFlight::new(),
            installed: AtomicBool::new(false),
            beacon_worker: Mutex::new(None),
        }
    }

    /// Wires the startup trigger once per context.
    ///
    /// Spawns a thread that waits `startup_delay` and then flushes. Returns
    /// `None` when triggers were already wired or the thread could not start.
    pub fn install(self: &Arc<Self>) -> Option<JoinHandle<FlushReport>> {
        if self.installed.swap(true, Ordering::AcqRel) {
            debug!("event=outbox_install module=outbox status=skipped reason=already_installed");
            return None;
        }
        self.lease.refresh();

        let scheduler = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("lifesync-startup-flush".to_string())
            .spawn(move || {
                std::thread::sleep(scheduler.startup_delay);
                scheduler.on_trigger(FlushTrigger::Startup)
            });
        match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(
                    "event=outbox_install module=outbox status=error error_code=spawn_failed error={}",
                    err
                );
                self.installed.store(false, Ordering::Release);
                None
            }
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    pub fn is_flushing(&self) -> bool {
        self.flight.is_busy()
    }

    /// Renews this context's lease and takes over orphaned namespaces.
    ///
    /// Adopted events are older than anything the caller is about to
    /// enqueue, so they end up ahead of it. Returns the adopted count.
    pub fn claim_pending(&self) -> usize {
        self.lease.refresh();
        self.lease.adopt_orphans(&self.queue)
    }

    pub fn on_trigger(&self, trigger: FlushTrigger) -> FlushReport {
        debug!(
            "event=outbox_trigger module=outbox trigger={}",
            trigger.as_str()
        );
        match trigger {
            FlushTrigger::Teardown => self.teardown(),
            FlushTrigger::Startup | FlushTrigger::Online | FlushTrigger::Foreground => {
                self.flush()
            }
        }
    }

    /// Delivers queued events head-first until drained or a retryable failure.
    pub fn flush(&self) -> FlushReport {
        let Some(_flight) = self.flight.try_acquire() else {
            debug!("event=outbox_flush module=outbox status=skipped reason=in_flight");
            return FlushReport::with_status(FlushStatus::Skipped, self.queue.len());
        };
        if !self.consent.allows_delivery() {
            return FlushReport::with_status(FlushStatus::BlockedByConsent, self.queue.len());
        }

        let started_at = Instant::now();
        self.lease.refresh();
        let adopted = self.lease.adopt_orphans(&self.queue);
        let declined_at = self.consent.declined_at();

        let mut settled = Vec::new();
        let mut report = FlushReport::with_status(FlushStatus::Drained, 0);
        report.adopted = adopted;

        for event in self.queue.snapshot() {
            if declined_at.is_some_and(|cutoff| event.enqueued_at <= cutoff) {
                settled.push(event.event_id);
                report.discarded += 1;
                continue;
            }
            if !self.consent.allows_delivery() {
                report.status = FlushStatus::BlockedByConsent;
                break;
            }
            match self.api.record_event(&event) {
                Ok(()) => {
                    self.notifier.publish(&DeliveryNotice::delivered(&event));
                    settled.push(event.event_id);
                    report.delivered.push(event.event_id);
                }
                Err(error) if !error.is_retryable() => {
                    warn!(
                        "event=outbox_reject module=outbox status=dropped event_id={} error_code={} error={}",
                        event.event_id,
                        error.code(),
                        error
                    );
                    settled.push(event.event_id);
                    report.rejected.push(RejectedEvent {
                        event_id: event.event_id,
                        error,
                    });
                }
                Err(error) => {
                    report.status = FlushStatus::Stopped { error };
                    break;
                }
            }
        }

        self.queue.acknowledge(&settled);
        report.remaining = self.queue.len();

        let status = match &report.status {
            FlushStatus::Drained => "ok",
            FlushStatus::Stopped { .. } => "stopped",
            _ => "blocked",
        };
        info!(
            "event=outbox_flush module=outbox status={} delivered={} rejected={} discarded={} adopted={} remaining={} duration_ms={}",
            status,
            report.delivered.len(),
            report.rejected.len(),
            report.discarded,
            report.adopted,
            report.remaining,
            started_at.elapsed().as_millis()
        );
        report
    }

    /// Beacons every queued event and frees this context's namespace.
    ///
    /// Beacons go out on a detached worker so teardown never waits on the
    /// network. Events stay queued: a beacon carries no acknowledgment.
    pub fn teardown(&self) -> FlushReport {
        let mut pending = self.queue.snapshot();
        if let Some(cutoff) = self.consent.declined_at() {
            let (stale, kept): (Vec<QueuedEvent>, Vec<QueuedEvent>) = pending
                .into_iter()
                .partition(|event| event.enqueued_at <= cutoff);
            if !stale.is_empty() {
                let ids: Vec<Uuid> = stale.iter().map(|event| event.event_id).collect();
                self.queue.acknowledge(&ids);
                debug!(
                    "event=outbox_teardown module=outbox status=discarded count={}",
                    ids.len()
                );
            }
            pending = kept;
        }

        let beaconed = if self.consent.allows_delivery() && !pending.is_empty() {
            let count = pending.len();
            if self.spawn_beacons(pending) {
                count
            } else {
                0
            }
        } else {
            0
        };
        self.lease.release();
        let remaining = self.queue.len();
        info!(
            "event=outbox_teardown module=outbox status=ok beaconed={} remaining={}",
            beaconed, remaining
        );
        FlushReport::with_status(FlushStatus::TornDown { beaconed }, remaining)
    }

    /// Blocks until the last teardown's beacon worker finished.
    ///
    /// Returns the number of beacons it sent, or `None` when no worker ran.
    pub fn wait_for_beacons(&self) -> Option<usize> {
        let handle = match self.beacon_worker.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }?;
        handle.join().ok()
    }

    /// Starts the beacon worker. Events stay queued if it cannot start.
    fn spawn_beacons(&self, events: Vec<QueuedEvent>) -> bool {
        let api = Arc::clone(&self.api);
        let spawned = std::thread::Builder::new()
            .name("lifesync-teardown-beacon".to_string())
            .spawn(move || send_beacons(api.as_ref(), &events));
        match spawned {
            Ok(handle) => {
                match self.beacon_worker.lock() {
                    Ok(mut slot) => *slot = Some(handle),
                    Err(poisoned) => *poisoned.into_inner() = Some(handle),
                }
                true
            }
            Err(err) => {
                warn!(
                    "event=outbox_teardown module=outbox status=error error_code=spawn_failed error={}",
                    err
                );
                false
            }
        }
    }

    /// Releases the namespace without sending anything.
    ///
    /// For short-lived contexts (CLI runs, background jobs) whose leftovers
    /// should be picked up by the next context that flushes.
    pub fn detach(&self) -> usize {
        let remaining = self.queue.len();
        self.lease.release();
        debug!(
            "event=outbox_detach module=outbox status=ok remaining={}",
            remaining
        );
        remaining
    }
}

fn send_beacons(api: &dyn ProgressApi, events: &[QueuedEvent]) -> usize {
    for event in events {
        api.send_beacon(event);
    }
    debug!(
        "event=outbox_beacon module=outbox status=sent count={}",
        events.len()
    );
    events.len()
}
