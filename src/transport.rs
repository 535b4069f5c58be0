//! Transport seam between the event source and the HTTP stack.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::Stream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::Client;

use crate::request::Request;
use crate::Error;

/// Boxed error carried by transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Incremental body bytes of a streaming response, in arrival order.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// What a transport hands back once response headers have arrived.
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// The response body as it trickles in.
    pub body: BodyStream,
}

/// An HTTP client capable of delivering a streaming response.
///
/// The event source depends on this seam rather than on a concrete client,
/// so tests substitute scripted doubles and callers can bring their own
/// stack.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue the request and resolve once response headers are available.
    async fn send(&self, request: &Request) -> Result<TransportResponse, BoxError>;
}

/// Default transport backed by reqwest.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport with a connect timeout only. An event stream stays
    /// open indefinitely, so no total-request timeout is set.
    pub fn new() -> Result<Self, Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<TransportResponse, BoxError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Box::new(e) as BoxError)?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| Box::new(e) as BoxError)?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map_err(|e| Box::new(e) as BoxError)
            .boxed();
        Ok(TransportResponse { status, body })
    }
}
