//! SSE message types.
//!
//! A transport reports each parsed event as a [`RawEvent`]. The connection
//! turns it into an [`SseMessage`], applying the default event name and
//! stamping the origin, and hands it to every matching handler.

use serde::de::DeserializeOwned;

use crate::error::{SseError, SseResult};

/// Event name used when the upstream event has no `event:` field.
pub const DEFAULT_EVENT_NAME: &str = "message";

/// An event as reported by a transport, before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEvent {
    /// Value of the `event:` field, if any.
    pub event: Option<String>,
    /// Joined `data:` lines.
    pub data: String,
    /// Value of the `id:` field, if any.
    pub id: Option<String>,
}

impl RawEvent {
    /// Create an unnamed event with the given data.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
            id: None,
        }
    }

    /// Set the event name.
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Set the event id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A parsed Server-Sent Event delivered to handlers.
///
/// # Example
///
/// ```
/// use archimedes_eventsource::{RawEvent, SseMessage};
///
/// let message = SseMessage::from_raw(RawEvent::new("hello"), "https://example.test/events");
///
/// assert_eq!(message.event_name(), "message");
/// assert_eq!(message.data(), "hello");
/// assert_eq!(message.id(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    event_name: String,
    data: String,
    origin: String,
    id: Option<String>,
}

impl SseMessage {
    /// Create a message.
    ///
    /// An empty `event_name` is replaced with [`DEFAULT_EVENT_NAME`].
    pub fn new(
        event_name: impl Into<String>,
        data: impl Into<String>,
        origin: impl Into<String>,
        id: Option<String>,
    ) -> Self {
        let mut event_name = event_name.into();
        if event_name.is_empty() {
            event_name = DEFAULT_EVENT_NAME.to_string();
        }
        Self {
            event_name,
            data: data.into(),
            origin: origin.into(),
            id,
        }
    }

    /// Build a message from a transport event received on `origin`.
    pub fn from_raw(raw: RawEvent, origin: impl Into<String>) -> Self {
        Self::new(raw.event.unwrap_or_default(), raw.data, origin, raw.id)
    }

    /// Get the event name.
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Get the data payload.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Get the URL the stream was opened on.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Get the event id, if the upstream event carried one.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Decode the data payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> SseResult<T> {
        serde_json::from_str(&self.data).map_err(|e| SseError::deserialization(e.to_string()))
    }
}
