// Events that flow from the trimmer to presentation and storage collaborators
//
// Notifications are fire-and-forget: the trimmer runs inside a synchronous
// payload callback and must never wait on whoever listens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use tokio::sync::mpsc;

/// Delivery shape a payload arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Complete JSON document
    Document,
    /// Streamed text fragment
    Fragment,
    /// JSON embedded in host text (inline script payloads)
    Embedded,
    /// Server-Sent Events body
    EventStream,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Document => "document",
            Channel::Fragment => "fragment",
            Channel::Embedded => "embedded",
            Channel::EventStream => "event_stream",
        }
    }
}

/// Main event type emitted by the trimmer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")] // {"type": "tail_meta", ...}
#[serde(rename_all = "snake_case")]
pub enum TrimEvent {
    /// Cached renderable counts for a conversation changed
    TailMeta {
        conv_id: String,
        timestamp: DateTime<Utc>,
        renderable_total: usize,
        kept_renderable: usize,
    },

    /// A payload was rewritten to its tail window
    Trimmed {
        conv_id: String,
        timestamp: DateTime<Utc>,
        channel: Channel,
        nodes_before: usize,
        nodes_after: usize,
        renderable_total: usize,
        kept_renderable: usize,
    },
}

impl TrimEvent {
    pub fn conv_id(&self) -> &str {
        match self {
            TrimEvent::TailMeta { conv_id, .. } | TrimEvent::Trimmed { conv_id, .. } => conv_id,
        }
    }
}

/// Fire-and-forget sink for [`TrimEvent`]s
pub trait Notifier {
    fn notify(&self, event: TrimEvent);
}

/// Drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: TrimEvent) {}
}

/// Bounded channel sink; a full or closed channel drops the event
impl Notifier for mpsc::Sender<TrimEvent> {
    fn notify(&self, event: TrimEvent) {
        if let Err(e) = self.try_send(event) {
            tracing::debug!("Trim event dropped: {}", e);
        }
    }
}

/// Keeps every event in memory, in order
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: RefCell<Vec<TrimEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<TrimEvent> {
        self.events.take()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: TrimEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn notify(&self, event: TrimEvent) {
        (**self).notify(event)
    }
}

/// `None` behaves like [`NoopNotifier`]
impl<N: Notifier> Notifier for Option<N> {
    fn notify(&self, event: TrimEvent) {
        if let Some(inner) = self {
            inner.notify(event);
        }
    }
}
