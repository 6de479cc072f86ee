//! Blocking HTTP implementation of the server contracts.
//!
//! # Invariants
//! - Every call carries `content-type: application/json`.
//! - Event submissions carry `idempotency-key: <event_id>`.
//! - Beacons use their own short-timeout agent and never surface errors.

use crate::config::CoreConfig;
use crate::model::entity::OwnerKey;
use crate::model::event::{EventRecordRequest, QueuedEvent};
use crate::transport::api::{
    CardApi, CardPullResponse, CardSyncRequest, CardSyncResponse, ConsentRequest, ProgressApi,
};
use crate::transport::error::{SubmitError, SubmitResult};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};

const EVENTS_PATH: &str = "/progress/events";
const CONSENT_PATH: &str = "/progress/consent";
const CARD_SYNC_PATH: &str = "/card/sync";
const CARD_PULL_PATH: &str = "/card/pull";

/// `ProgressApi` and `CardApi` over `ureq`.
pub struct HttpApi {
    config: CoreConfig,
    agent: ureq::Agent,
    beacon_agent: ureq::Agent,
}

impl HttpApi {
    pub fn new(config: &CoreConfig) -> Self {
        let request_timeout = Duration::from_millis(config.request_timeout_ms);
        let beacon_timeout = Duration::from_millis(config.beacon_timeout_ms);
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
            .timeout_read(request_timeout)
            .timeout_write(request_timeout)
            .build();
        let beacon_agent = ureq::AgentBuilder::new()
            .timeout(beacon_timeout)
            .build();
        Self {
            config: config.clone(),
            agent,
            beacon_agent,
        }
    }

    fn request(&self, agent: &ureq::Agent, method: &str, path: &str) -> ureq::Request {
        let mut request = agent
            .request(method, &self.config.endpoint(path))
            .set("content-type", "application/json")
            .set("accept", "application/json");
        if let Some(token) = self.config.bearer_token.as_deref() {
            request = request.set("authorization", &format!("Bearer {token}"));
        }
        request
    }

    fn post_json(
        &self,
        agent: &ureq::Agent,
        path: &str,
        body: &impl Serialize,
        idempotency_key: Option<&str>,
    ) -> SubmitResult<ureq::Response> {
        let payload =
            serde_json::to_string(body).map_err(|err| SubmitError::Encode(err.to_string()))?;
        let mut request = self.request(agent, "POST", path);
        if let Some(key) = idempotency_key {
            request = request.set("idempotency-key", key);
        }
        finish(request.send_string(&payload))
    }
}

impl ProgressApi for HttpApi {
    fn record_event(&self, event: &QueuedEvent) -> SubmitResult<()> {
        let started_at = Instant::now();
        let event_id = event.event_id.to_string();
        let result = self
            .post_json(
                &self.agent,
                EVENTS_PATH,
                &EventRecordRequest::from(event),
                Some(event_id.as_str()),
            )
            .map(|_| ());
        match &result {
            Ok(()) => debug!(
                "event=progress_submit module=transport status=ok event_id={} duration_ms={}",
                event_id,
                started_at.elapsed().as_millis()
            ),
            Err(err) => debug!(
                "event=progress_submit module=transport status=error event_id={} error_code={} duration_ms={}",
                event_id,
                err.code(),
                started_at.elapsed().as_millis()
            ),
        }
        result
    }

    fn send_beacon(&self, event: &QueuedEvent) {
        let event_id = event.event_id.to_string();
        if let Err(err) = self.post_json(
            &self.beacon_agent,
            EVENTS_PATH,
            &EventRecordRequest::from(event),
            Some(event_id.as_str()),
        ) {
            debug!(
                "event=progress_beacon module=transport status=ignored event_id={} error_code={}",
                event_id,
                err.code()
            );
        }
    }

    fn set_consent(&self, enabled: bool) -> SubmitResult<()> {
        self.post_json(&self.agent, CONSENT_PATH, &ConsentRequest { enabled }, None)
            .map(|_| ())
    }
}

impl CardApi for HttpApi {
    fn pull(&self, owner_key: &OwnerKey) -> SubmitResult<CardPullResponse> {
        let response = finish(
            self.request(&self.agent, "GET", CARD_PULL_PATH)
                .query("ownerKey", &owner_key.to_string())
                .call(),
        )?;
        decode(response)
    }

    fn push(&self, request: &CardSyncRequest) -> SubmitResult<CardSyncResponse> {
        let response = self.post_json(&self.agent, CARD_SYNC_PATH, request, None)?;
        decode(response)
    }
}

fn finish(result: Result<ureq::Response, ureq::Error>) -> SubmitResult<ureq::Response> {
    match result {
        Ok(response) if (200..=299).contains(&response.status()) => Ok(response),
        Ok(response) => Err(SubmitError::from_status(response.status())),
        Err(ureq::Error::Status(status, _)) => Err(SubmitError::from_status(status)),
        Err(ureq::Error::Transport(transport)) => {
            warn!(
                "event=http_call module=transport status=error error_code=transport kind={:?}",
                transport.kind()
            );
            Err(SubmitError::Transport(transport.to_string()))
        }
    }
}

fn decode<T: DeserializeOwned>(response: ureq::Response) -> SubmitResult<T> {
    response
        .into_json::<T>()
        .map_err(|err| SubmitError::Decode(err.to_string()))
}
