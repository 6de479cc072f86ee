#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use lifesync_core::transport::api::{
    CardPullResponse, CardSyncRequest, CardSyncResponse, RemoteEntity, SyncItemResult,
};
use lifesync_core::{
    CardApi, CoreConfig, EventBody, EventKind, OwnerKey, ProgressApi, QueuedEvent, SubmitError,
    SubmitResult,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

pub fn test_config() -> CoreConfig {
    CoreConfig {
        startup_flush_delay_ms: 0,
        ..CoreConfig::default()
    }
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, day, hour, 0, 0).unwrap()
}

pub fn view(subject: &str) -> EventBody {
    EventBody::new(EventKind::View, subject)
}

pub fn subjects(events: &[QueuedEvent]) -> Vec<String> {
    events
        .iter()
        .map(|event| event.body.subject_id.clone())
        .collect()
}

/// Records every progress call; scripted failures are consumed in order.
#[derive(Default)]
pub struct FakeProgressApi {
    offline: AtomicBool,
    script: Mutex<VecDeque<SubmitError>>,
    script_after: Mutex<Option<(usize, SubmitError)>>,
    attempts: AtomicUsize,
    delivered: Mutex<Vec<QueuedEvent>>,
    beacons: Mutex<Vec<QueuedEvent>>,
    consent_failures: Mutex<VecDeque<SubmitError>>,
    consent_calls: Mutex<Vec<bool>>,
    hold: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl FakeProgressApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a transport error until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fail_next(&self, error: SubmitError) {
        self.script.lock().unwrap().push_back(error);
    }

    /// Fails the call whose 1-based attempt number equals `attempt`.
    pub fn fail_attempt(&self, attempt: usize, error: SubmitError) {
        *self.script_after.lock().unwrap() = Some((attempt, error));
    }

    pub fn fail_next_consent(&self, error: SubmitError) {
        self.consent_failures.lock().unwrap().push_back(error);
    }

    /// Parks the next `record_event` or `send_beacon` call until the returned sender fires.
    ///
    /// The returned receiver signals that the call has started.
    pub fn hold_next_call(&self) -> (Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = channel();
        let (release_tx, release_rx) = channel();
        *self.hold.lock().unwrap() = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<QueuedEvent> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_subjects(&self) -> Vec<String> {
        subjects(&self.delivered())
    }

    pub fn beacons(&self) -> Vec<QueuedEvent> {
        self.beacons.lock().unwrap().clone()
    }

    pub fn consent_calls(&self) -> Vec<bool> {
        self.consent_calls.lock().unwrap().clone()
    }

    fn wait_if_held(&self) {
        let hold = self.hold.lock().unwrap().take();
        if let Some((entered, release)) = hold {
            let _ = entered.send(());
            let _ = release.recv();
        }
    }

    /// Total network calls of any kind.
    pub fn network_calls(&self) -> usize {
        self.attempts() + self.beacons.lock().unwrap().len() + self.consent_calls().len()
    }
}

impl ProgressApi for FakeProgressApi {
    fn record_event(&self, event: &QueuedEvent) -> SubmitResult<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.wait_if_held();

        if self.offline.load(Ordering::SeqCst) {
            return Err(SubmitError::Transport("connection refused".to_string()));
        }
        {
            let mut scripted = self.script_after.lock().unwrap();
            if scripted.as_ref().is_some_and(|(n, _)| *n == attempt) {
                if let Some((_, error)) = scripted.take() {
                    return Err(error);
                }
            }
        }
        if let Some(error) = self.script.lock().unwrap().pop_front() {
            return Err(error);
        }

        self.delivered.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn send_beacon(&self, event: &QueuedEvent) {
        self.wait_if_held();
        self.beacons.lock().unwrap().push(event.clone());
    }

    fn set_consent(&self, enabled: bool) -> SubmitResult<()> {
        self.consent_calls.lock().unwrap().push(enabled);
        match self.consent_failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// In-memory card server.
///
/// Holds the server copies returned by `pull` and answers `push` by
/// bumping a version per accepted item, unless an id is told to fail.
#[derive(Default)]
pub struct FakeCardApi {
    pull_failure: Mutex<Option<SubmitError>>,
    push_failure: Mutex<Option<SubmitError>>,
    profiles: Mutex<Vec<RemoteEntity>>,
    contacts: Mutex<Vec<RemoteEntity>>,
    rejected_ids: Mutex<Vec<String>>,
    silent_ids: Mutex<Vec<String>>,
    pushes: Mutex<Vec<CardSyncRequest>>,
    pulls: Mutex<Vec<OwnerKey>>,
}

impl FakeCardApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, remote: RemoteEntity) -> Self {
        self.profiles.lock().unwrap().push(remote);
        self
    }

    pub fn with_contact(self, remote: RemoteEntity) -> Self {
        self.contacts.lock().unwrap().push(remote);
        self
    }

    pub fn fail_pull(&self, error: SubmitError) {
        *self.pull_failure.lock().unwrap() = Some(error);
    }

    pub fn fail_push(&self, error: SubmitError) {
        *self.push_failure.lock().unwrap() = Some(error);
    }

    pub fn reject_id(&self, id: &str) {
        self.rejected_ids.lock().unwrap().push(id.to_string());
    }

    /// The server omits this id from the push response entirely.
    pub fn omit_id(&self, id: &str) {
        self.silent_ids.lock().unwrap().push(id.to_string());
    }

    pub fn pushes(&self) -> Vec<CardSyncRequest> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn pull_count(&self) -> usize {
        self.pulls.lock().unwrap().len()
    }

    fn settle(&self, payload_id: &str, known: &[RemoteEntity]) -> Option<SyncItemResult> {
        if self.silent_ids.lock().unwrap().iter().any(|id| id == payload_id) {
            return None;
        }
        if self.rejected_ids.lock().unwrap().iter().any(|id| id == payload_id) {
            return Some(SyncItemResult {
                success: false,
                id: payload_id.to_string(),
                version: None,
                error: Some("validation failed".to_string()),
            });
        }
        let current = known
            .iter()
            .find(|remote| remote.id == payload_id)
            .map_or(0, |remote| remote.version);
        Some(SyncItemResult {
            success: true,
            id: payload_id.to_string(),
            version: Some(current + 1),
            error: None,
        })
    }
}

impl CardApi for FakeCardApi {
    fn pull(&self, owner_key: &OwnerKey) -> SubmitResult<CardPullResponse> {
        self.pulls.lock().unwrap().push(owner_key.clone());
        if let Some(error) = self.pull_failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(CardPullResponse {
            profiles: self.profiles.lock().unwrap().clone(),
            contacts: self.contacts.lock().unwrap().clone(),
        })
    }

    fn push(&self, request: &CardSyncRequest) -> SubmitResult<CardSyncResponse> {
        self.pushes.lock().unwrap().push(request.clone());
        if let Some(error) = self.push_failure.lock().unwrap().clone() {
            return Err(error);
        }

        let known_profiles = self.profiles.lock().unwrap().clone();
        let known_contacts = self.contacts.lock().unwrap().clone();
        let profiles: Vec<SyncItemResult> = request
            .profiles
            .iter()
            .filter_map(|payload| self.settle(&payload.id, &known_profiles))
            .collect();
        let contacts: Vec<SyncItemResult> = request
            .contacts
            .iter()
            .filter_map(|payload| self.settle(&payload.id, &known_contacts))
            .collect();
        let synced = profiles
            .iter()
            .chain(contacts.iter())
            .filter(|item| item.success)
            .count() as u32;
        let failed = request.len() as u32 - synced;

        Ok(CardSyncResponse {
            profiles,
            contacts,
            synced,
            failed,
        })
    }
}
