//! The event record produced by the stream parser.

/// A single decoded Server-Sent Events record.
///
/// Constructed by the parser once a complete event (terminated by a blank
/// line) has been assembled from the byte stream; immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event id (optional). The last id seen on the stream carries into
    /// subsequent records until the server overwrites it.
    pub id: Option<String>,
    /// Event type name (optional); absent means plain "message" semantics.
    pub event: Option<String>,
    /// Payload. Multi-line payloads are newline-joined.
    pub data: String,
    /// Server-suggested reconnect delay in milliseconds. Informational only.
    pub retry: Option<u64>,
}

impl Event {
    /// Create an event with just a data payload.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            id: None,
            event: None,
            data: data.into(),
            retry: None,
        }
    }

    /// Check if this is a "done" sentinel (used by OpenAI-style providers to
    /// signal end of stream).
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}
