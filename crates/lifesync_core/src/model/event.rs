//! Progress event model.
//!
//! # Invariants
//! - `subject_id` is never blank.
//! - `event_id` is generated once and survives every retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Kind of user progress recorded against a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    View,
    Start,
    Complete,
    Bookmark,
    Unbookmark,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Bookmark => "bookmark",
            Self::Unbookmark => "unbookmark",
        }
    }
}

/// Event payload as raised by UI code.
///
/// The subject is part of the body on purpose: callers pass it explicitly on
/// every tracking call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBody {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl EventBody {
    pub fn new(kind: EventKind, subject_id: impl Into<String>) -> Self {
        Self {
            kind,
            subject_id: subject_id.into(),
            path: None,
            metadata: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    pub fn validate(&self) -> Result<(), EventValidationError> {
        if self.subject_id.trim().is_empty() {
            return Err(EventValidationError::BlankSubjectId);
        }
        Ok(())
    }
}

/// Event accepted by the application but not yet confirmed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedEvent {
    pub event_id: Uuid,
    pub body: EventBody,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedEvent {
    /// Wraps a body with a fresh idempotency key and the current time.
    pub fn new(body: EventBody) -> Self {
        Self::at(body, Utc::now())
    }

    pub fn at(body: EventBody, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            body,
            enqueued_at,
        }
    }
}

/// Wire body for `POST /progress/events`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecordRequest<'a> {
    pub event_id: Uuid,
    #[serde(flatten)]
    pub body: &'a EventBody,
}

impl<'a> From<&'a QueuedEvent> for EventRecordRequest<'a> {
    fn from(event: &'a QueuedEvent) -> Self {
        Self {
            event_id: event.event_id,
            body: &event.body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventValidationError {
    BlankSubjectId,
}

impl Display for EventValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankSubjectId => write!(f, "event subject id cannot be blank"),
        }
    }
}

impl Error for EventValidationError {}
