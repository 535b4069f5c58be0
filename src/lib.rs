//! A cancellable streaming client for Server-Sent Events (SSE).
//!
//! This library connects to a `text/event-stream` endpoint and exposes the
//! response as a lazily-started, single-consumer stream of parsed events and
//! lifecycle items (`Open`, `Event`, `Error`, `Closed`). It is built with
//! LLM-style streaming APIs in mind: POST bodies, `[DONE]` sentinels, and
//! providers that emit raw JSON lines are all supported.

pub mod error;
pub mod event;
pub mod parser;
pub mod request;
pub mod source;
pub mod transport;

// Re-export core types for easy usage
pub use error::Error;
pub use event::Event;
pub use parser::{ParseMode, Parser};
pub use request::Request;
pub use source::{EventSource, EventStream, ReadyState, StreamItem};
pub use transport::{BodyStream, BoxError, HttpTransport, Transport, TransportResponse};
