//! Plain-data description of the request that opens an event stream.

use bytes::Bytes;

/// An outbound HTTP request, independent of any concrete client.
///
/// The event source adds the stream-specific headers (`Accept`,
/// `Cache-Control`, `Last-Event-ID`) when the connection is opened; anything
/// set here rides along unchanged.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl Request {
    /// Request with an arbitrary method.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// GET request, the classic EventSource shape.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// POST request, for streaming inference endpoints.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Replace a header if present (case-insensitive), append otherwise.
    pub(crate) fn set_header(&mut self, name: &str, value: impl Into<String>) {
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value.into(),
            None => self.headers.push((name.to_string(), value.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chains() {
        let request = Request::post("http://example.test/v1/chat")
            .header("Authorization", "Bearer key")
            .body("{\"stream\":true}");

        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "http://example.test/v1/chat");
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.body.as_deref(), Some(b"{\"stream\":true}".as_slice()));
    }

    #[test]
    fn test_set_header_replaces_case_insensitively() {
        let mut request = Request::get("http://example.test").header("accept", "application/json");
        request.set_header("Accept", "text/event-stream");
        request.set_header("Last-Event-ID", "42");

        assert_eq!(
            request.headers,
            vec![
                ("accept".to_string(), "text/event-stream".to_string()),
                ("Last-Event-ID".to_string(), "42".to_string()),
            ]
        );
    }
}
