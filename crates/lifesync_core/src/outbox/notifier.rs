//! Cross-context delivery notices.
//!
//! Notices are latency hints for progress views in other contexts. They are
//! never a source of truth and publishing never fails.

use crate::model::event::{EventKind, QueuedEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeKind {
    #[serde(rename = "event-delivered")]
    EventDelivered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryNotice {
    pub kind: NoticeKind,
    pub subject_id: String,
    pub event_type: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryNotice {
    pub fn delivered(event: &QueuedEvent) -> Self {
        Self {
            kind: NoticeKind::EventDelivered,
            subject_id: event.body.subject_id.clone(),
            event_type: event.body.kind,
            timestamp: Utc::now(),
        }
    }
}

/// Outbound side of the notice channel, injected per context.
pub trait DeliveryNotifier: Send + Sync {
    fn publish(&self, notice: &DeliveryNotice);
}

/// For contexts without any channel support.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl DeliveryNotifier for NoopNotifier {
    fn publish(&self, _notice: &DeliveryNotice) {}
}

/// Named in-process channels shared by the contexts of one client.
#[derive(Debug, Default)]
pub struct BroadcastHub {
    channels: Mutex<HashMap<String, Vec<Sender<DeliveryNotice>>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, channel_name: &str) -> Receiver<DeliveryNotice> {
        let (sender, receiver) = channel();
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel_name.to_string())
            .or_default()
            .push(sender);
        receiver
    }

    /// Sends to every live subscriber and prunes dropped ones.
    ///
    /// Returns how many subscribers received the notice.
    pub fn publish_on(&self, channel_name: &str, notice: &DeliveryNotice) -> usize {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = channels.get_mut(channel_name) else {
            return 0;
        };
        subscribers.retain(|sender| sender.send(notice.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self, channel_name: &str) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel_name)
            .map_or(0, Vec::len)
    }
}

/// `DeliveryNotifier` bound to one named channel of a hub.
pub struct ChannelNotifier {
    hub: Arc<BroadcastHub>,
    channel_name: String,
}

impl ChannelNotifier {
    pub fn new(hub: Arc<BroadcastHub>, channel_name: impl Into<String>) -> Self {
        Self {
            hub,
            channel_name: channel_name.into(),
        }
    }
}

impl DeliveryNotifier for ChannelNotifier {
    fn publish(&self, notice: &DeliveryNotice) {
        self.hub.publish_on(&self.channel_name, notice);
    }
}
