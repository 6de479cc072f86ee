mod common;

use common::{subjects, test_config, view, FakeProgressApi};
use lifesync_core::outbox::consent::CONSENT_KEY;
use lifesync_core::{
    namespace_depths, ClientContext, ConsentState, FlushStatus, KeyValueStore, MemoryKvStore,
    QueuedEvent, SubmitError, TrackOutcome,
};
use std::sync::Arc;

fn open(
    store: &Arc<dyn KeyValueStore>,
    api: &Arc<FakeProgressApi>,
) -> ClientContext {
    ClientContext::open(&test_config(), store.clone(), None, api.clone())
}

#[test]
fn unset_consent_allows_delivery() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
    let api = Arc::new(FakeProgressApi::new());
    let context = open(&store, &api);

    assert_eq!(context.consent_state(), ConsentState::Unset);
    assert_eq!(context.track(view("s1")), TrackOutcome::Delivered);
}

#[test]
fn declined_consent_makes_no_network_requests() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
    let api = Arc::new(FakeProgressApi::new());
    let context = open(&store, &api);
    context.decline_consent();
    let calls_after_decline = api.network_calls();

    for subject in ["a", "b", "c", "d", "e"] {
        assert_eq!(context.track(view(subject)), TrackOutcome::DroppedNoConsent);
    }
    assert_eq!(context.flush().status, FlushStatus::BlockedByConsent);
    assert_eq!(
        context.teardown().status,
        FlushStatus::TornDown { beaconed: 0 }
    );

    assert_eq!(api.network_calls(), calls_after_decline);
    assert_eq!(api.attempts(), 0);
    assert!(api.beacons().is_empty());
    assert!(context.queue().is_empty());
}

#[test]
fn enable_is_stored_only_after_the_server_confirms() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
    let api = Arc::new(FakeProgressApi::new());
    let context = open(&store, &api);
    context.decline_consent();
    api.fail_next_consent(SubmitError::from_status(503));

    let err = context
        .enable_consent()
        .expect_err("server failure should block enabling");
    assert_eq!(err, SubmitError::Unavailable { status: 503 });
    assert_eq!(context.consent_state(), ConsentState::Declined);

    assert_eq!(
        context.enable_consent().expect("enable should succeed"),
        ConsentState::Enabled
    );
    assert_eq!(context.consent_state(), ConsentState::Enabled);
    assert_eq!(api.consent_calls(), [false, true, true]);
}

#[test]
fn decline_still_applies_when_the_server_cannot_be_told() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
    let api = Arc::new(FakeProgressApi::new());
    let context = open(&store, &api);
    api.fail_next_consent(SubmitError::Transport("offline".to_string()));

    assert_eq!(context.decline_consent(), ConsentState::Declined);
    assert_eq!(context.consent_state(), ConsentState::Declined);
    assert!(store.get(CONSENT_KEY).unwrap().is_some());
}

#[test]
fn decline_is_seen_by_other_contexts() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
    let api = Arc::new(FakeProgressApi::new());
    let first = open(&store, &api);
    let second = open(&store, &api);

    first.decline_consent();

    assert_eq!(second.consent_state(), ConsentState::Declined);
    assert_eq!(second.track(view("s1")), TrackOutcome::DroppedNoConsent);
}

#[test]
fn events_queued_before_a_decline_are_never_sent() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
    let api = Arc::new(FakeProgressApi::new());
    let first = open(&store, &api);
    let second = open(&store, &api);
    first.queue().enqueue(QueuedEvent::new(view("own")));
    second.queue().enqueue(QueuedEvent::new(view("foreign")));

    first.decline_consent();

    assert!(first.queue().is_empty());
    assert!(namespace_depths(store.as_ref())
        .iter()
        .all(|(_, depth)| *depth == 0));

    first.enable_consent().expect("enable should succeed");
    // `second` still holds its pre-decline event in memory.
    let report = second.flush();
    assert!(report.is_drained());
    assert_eq!(report.discarded, 1);
    assert!(report.delivered.is_empty());
    assert!(api.delivered().is_empty());

    assert_eq!(first.track(view("after")), TrackOutcome::Delivered);
    assert_eq!(api.delivered_subjects(), ["after"]);
}

#[test]
fn teardown_after_reenabling_drops_pre_decline_events_unsent() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
    let api = Arc::new(FakeProgressApi::new());
    let first = open(&store, &api);
    let second = open(&store, &api);
    second.queue().enqueue(QueuedEvent::new(view("before-decline")));

    first.decline_consent();
    first.enable_consent().expect("enable should succeed");
    second.queue().enqueue(QueuedEvent::new(view("after-enable")));

    let report = second.teardown();

    assert_eq!(report.status, FlushStatus::TornDown { beaconed: 1 });
    assert_eq!(second.scheduler().wait_for_beacons(), Some(1));
    assert_eq!(subjects(&api.beacons()), ["after-enable"]);
    assert_eq!(subjects(&second.queue().read_all()), ["after-enable"]);
}
