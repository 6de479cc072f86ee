//! One client context (tab/window equivalent) and its collaborators.
//!
//! # Responsibility
//! - Build the queue, lease, notifier, consent gate, scheduler and tracker
//!   of one context over shared storage.
//! - Expose the lifecycle and consent operations UI code needs.
//!
//! # Invariants
//! - Every context gets a fresh id and therefore its own queue namespace.
//! - Collaborators are injected; nothing is a process-wide singleton.

use crate::config::CoreConfig;
use crate::model::consent::ConsentState;
use crate::model::event::EventBody;
use crate::outbox::consent::ConsentGate;
use crate::outbox::lease::ContextLease;
use crate::outbox::notifier::{
    BroadcastHub, ChannelNotifier, DeliveryNotice, DeliveryNotifier, NoopNotifier,
};
use crate::outbox::queue::DurableQueue;
use crate::outbox::scheduler::{FlushReport, FlushScheduler, FlushTrigger};
use crate::service::progress_service::{ProgressTracker, TrackOutcome};
use crate::storage::kv::KeyValueStore;
use crate::transport::api::ProgressApi;
use crate::transport::error::SubmitResult;
use log::info;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;
use uuid::Uuid;

pub struct ClientContext {
    id: String,
    channel_name: String,
    hub: Arc<BroadcastHub>,
    api: Arc<dyn ProgressApi>,
    queue: Arc<DurableQueue>,
    consent: Arc<ConsentGate>,
    scheduler: Arc<FlushScheduler>,
    tracker: ProgressTracker,
}

impl ClientContext {
    /// Opens a context over `store`.
    ///
    /// Contexts passing the same `hub` see each other's delivery notices.
    /// Without a hub the context gets a private one, so only its own
    /// subscribers are told.
    pub fn open(
        config: &CoreConfig,
        store: Arc<dyn KeyValueStore>,
        hub: Option<Arc<BroadcastHub>>,
        api: Arc<dyn ProgressApi>,
    ) -> Self {
        let hub = hub.unwrap_or_else(|| Arc::new(BroadcastHub::new()));
        let notifier: Arc<dyn DeliveryNotifier> =
            Arc::new(ChannelNotifier::new(hub.clone(), config.notify_channel.clone()));
        Self::assemble(config, store, hub, notifier, api)
    }

    /// Opens a context that publishes no delivery notices at all.
    ///
    /// For one-shot callers with nobody listening, such as the CLI.
    /// `subscribe` still works but never yields anything.
    pub fn open_without_notices(
        config: &CoreConfig,
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn ProgressApi>,
    ) -> Self {
        Self::assemble(
            config,
            store,
            Arc::new(BroadcastHub::new()),
            Arc::new(NoopNotifier),
            api,
        )
    }

    fn assemble(
        config: &CoreConfig,
        store: Arc<dyn KeyValueStore>,
        hub: Arc<BroadcastHub>,
        notifier: Arc<dyn DeliveryNotifier>,
        api: Arc<dyn ProgressApi>,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let queue = Arc::new(DurableQueue::open(
            store.clone(),
            &id,
            config.outbox_capacity,
            config.overflow_policy,
        ));
        let lease = Arc::new(ContextLease::new(store.clone(), id.clone(), config.lease_ttl_ms));
        lease.refresh();
        let consent = Arc::new(ConsentGate::new(store));
        let scheduler = Arc::new(FlushScheduler::new(
            queue.clone(),
            api.clone(),
            notifier.clone(),
            consent.clone(),
            lease,
            config.startup_flush_delay(),
        ));
        let tracker = ProgressTracker::new(
            api.clone(),
            queue.clone(),
            notifier,
            consent.clone(),
            scheduler.clone(),
        );

        info!(
            "event=context_open module=service status=ok context={} capacity={} policy={}",
            id,
            queue.capacity(),
            queue.policy().as_str()
        );

        Self {
            id,
            channel_name: config.notify_channel.clone(),
            hub,
            api,
            queue,
            consent,
            scheduler,
            tracker,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn queue(&self) -> &DurableQueue {
        &self.queue
    }

    pub fn scheduler(&self) -> &Arc<FlushScheduler> {
        &self.scheduler
    }

    /// Subscribes to delivery notices on this context's channel.
    pub fn subscribe(&self) -> Receiver<DeliveryNotice> {
        self.hub.subscribe(&self.channel_name)
    }

    pub fn track(&self, body: EventBody) -> TrackOutcome {
        self.tracker.track(body)
    }

    /// Wires the delayed startup flush; a no-op after the first call.
    pub fn install_triggers(&self) -> Option<JoinHandle<FlushReport>> {
        self.scheduler.install()
    }

    pub fn on_trigger(&self, trigger: FlushTrigger) -> FlushReport {
        self.scheduler.on_trigger(trigger)
    }

    pub fn flush(&self) -> FlushReport {
        self.scheduler.flush()
    }

    pub fn teardown(&self) -> FlushReport {
        self.scheduler.teardown()
    }

    /// Leaves without beacons; pending events become adoptable at once.
    pub fn detach(&self) -> usize {
        self.scheduler.detach()
    }

    pub fn consent_state(&self) -> ConsentState {
        self.consent.state()
    }

    pub fn enable_consent(&self) -> SubmitResult<ConsentState> {
        self.consent.enable(self.api.as_ref())
    }

    pub fn decline_consent(&self) -> ConsentState {
        self.consent.decline(self.api.as_ref(), &self.queue)
    }
}
