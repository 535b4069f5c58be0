use std::borrow::Cow;

use bytes::Bytes;
use thiserror::Error;

use crate::transport::BoxError;

/// Errors surfaced on an event stream.
///
/// These are delivered in-band as [`StreamItem::Error`](crate::StreamItem)
/// items, never thrown from starting the stream itself; an `Error` item is
/// always followed by a `Closed` item.
#[derive(Error, Debug)]
pub enum Error {
    /// The output sequence of an event source was started more than once.
    #[error("event stream has already been consumed")]
    AlreadyConsumed,

    /// The server answered with a non-success status. The body is whatever
    /// was captured before the connection finished, typically a JSON error
    /// payload.
    #[error("server responded with status {status}")]
    Connection { status: u16, body: Bytes },

    /// DNS, TLS, timeout, or socket-level failure from the transport.
    #[error("transport failure: {0}")]
    Transport(#[source] BoxError),
}

impl Error {
    pub fn connection(status: u16, body: impl Into<Bytes>) -> Self {
        Error::Connection {
            status,
            body: body.into(),
        }
    }

    pub fn transport(err: impl Into<BoxError>) -> Self {
        Error::Transport(err.into())
    }

    /// HTTP status code, for connection errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Connection { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Best-effort text rendering of a connection error body.
    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Error::Connection { body, .. } => Some(String::from_utf8_lossy(body)),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = Error::connection(500, "{\"error\":\"boom\"}".as_bytes().to_vec());
        assert!(error.to_string().contains("500"));
        assert_eq!(error.status(), Some(500));
        assert_eq!(error.body_text().unwrap(), "{\"error\":\"boom\"}");

        let error = Error::AlreadyConsumed;
        assert!(error.to_string().contains("already been consumed"));
        assert_eq!(error.status(), None);
        assert!(error.body_text().is_none());
    }

    #[test]
    fn test_transport_error_wraps_source() {
        let error = Error::transport("connection refused");
        assert!(error.to_string().contains("connection refused"));
    }
}
