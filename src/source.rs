//! The event source orchestrator and its consumer-facing stream.
//!
//! One [`EventSource`] owns one connection attempt: it issues the request
//! lazily when its output stream is first polled, classifies the response
//! status, pumps body chunks through a [`Parser`], and republishes parsed
//! events plus lifecycle signals to the single consumer. Transport callbacks
//! run on their own task; a channel hands items across to wherever the
//! consumer iterates.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{ready, Context, Poll};

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::event::Event;
use crate::parser::{ParseMode, Parser};
use crate::request::Request;
use crate::transport::{HttpTransport, Transport};
use crate::Error;

/// Lifecycle of one streaming connection.
///
/// Moves forward only; `Closed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Not yet started.
    Idle,
    /// Request issued, awaiting response headers.
    Connecting,
    /// Success headers received, data flowing.
    Open,
    /// Terminal; nothing further will be produced.
    Closed,
}

/// Items produced by an [`EventStream`].
#[derive(Debug)]
pub enum StreamItem {
    /// The connection was established with a success status. Always precedes
    /// the first `Event`.
    Open,
    /// One complete event arrived on the stream.
    Event(Event),
    /// Something went wrong. A `Closed` item always follows; treat `Error`
    /// as non-terminal by itself.
    Error(Error),
    /// Terminal item; the stream ends after this.
    Closed,
}

/// Mutable task state, grouped behind one lock so no cross-field race is
/// observable.
struct Inner {
    state: ReadyState,
    last_event_id: Option<String>,
    tx: Option<UnboundedSender<StreamItem>>,
    abort: Option<AbortHandle>,
}

struct Shared {
    consumed: AtomicBool,
    inner: Mutex<Inner>,
}

impl Shared {
    fn new() -> Self {
        Self {
            consumed: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                state: ReadyState::Idle,
                last_event_id: None,
                tx: None,
                abort: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver one item unless the stream has already closed.
    fn emit(&self, item: StreamItem) {
        let mut inner = self.lock();
        if inner.state == ReadyState::Closed {
            return;
        }
        if matches!(item, StreamItem::Open) {
            inner.state = ReadyState::Open;
        }
        if let Some(tx) = &inner.tx {
            let _ = tx.send(item);
        }
    }

    fn record_last_id(&self, id: &str) {
        let mut inner = self.lock();
        if inner.state == ReadyState::Closed {
            return;
        }
        inner.last_event_id = Some(id.to_string());
    }

    /// Deliver an error and then the terminal close under one lock, so a
    /// concurrent cancellation cannot interleave between the two items.
    fn fail(&self, error: Error) {
        let mut inner = self.lock();
        if inner.state == ReadyState::Closed {
            return;
        }
        if let Some(tx) = &inner.tx {
            let _ = tx.send(StreamItem::Error(error));
        }
        Self::close_locked(&mut inner);
    }

    /// Transition to `Closed`, deliver the single terminal item, and release
    /// the transport. Idempotent.
    fn close(&self) {
        let mut inner = self.lock();
        if inner.state == ReadyState::Closed {
            return;
        }
        Self::close_locked(&mut inner);
    }

    fn close_locked(inner: &mut Inner) {
        inner.state = ReadyState::Closed;
        if let Some(tx) = inner.tx.take() {
            let _ = tx.send(StreamItem::Closed);
        }
        if let Some(abort) = inner.abort.take() {
            abort.abort();
        }
    }
}

/// A single-use streaming connection to a Server-Sent Events endpoint.
///
/// Created per request. No network work happens until the stream returned by
/// [`events`](EventSource::events) is first polled; dropping that stream or
/// calling [`cancel`](EventSource::cancel) tears the connection down.
pub struct EventSource {
    request: Request,
    transport: Arc<dyn Transport>,
    mode: ParseMode,
    shared: Arc<Shared>,
}

impl EventSource {
    /// Create an event source using the default reqwest transport.
    pub fn new(request: Request) -> Result<Self, Error> {
        Ok(Self::with_transport(request, Arc::new(HttpTransport::new()?)))
    }

    /// Create an event source over a caller-supplied transport.
    pub fn with_transport(request: Request, transport: Arc<dyn Transport>) -> Self {
        Self {
            request,
            transport,
            mode: ParseMode::Standard,
            shared: Arc::new(Shared::new()),
        }
    }

    /// Treat every response line as a literal data payload instead of the
    /// `field:value` grammar. For providers that emit raw JSON lines.
    pub fn data_only(mut self) -> Self {
        self.mode = ParseMode::DataOnly;
        self
    }

    /// Seed the `Last-Event-ID` request header, resuming from the cursor of
    /// a previous connection.
    pub fn with_last_event_id(self, id: impl Into<String>) -> Self {
        self.shared.lock().last_event_id = Some(id.into());
        self
    }

    /// Start the output sequence.
    ///
    /// May be called at most once. A second call yields a stream that
    /// immediately produces [`Error::AlreadyConsumed`] followed by `Closed`,
    /// without touching the network.
    pub fn events(&self) -> EventStream {
        if self.shared.consumed.swap(true, Ordering::SeqCst) {
            return EventStream::scripted(vec![
                StreamItem::Error(Error::AlreadyConsumed),
                StreamItem::Closed,
            ]);
        }

        let mut request = self.request.clone();
        let last_id = self.shared.lock().last_event_id.clone().unwrap_or_default();
        request.set_header("Accept", "text/event-stream");
        request.set_header("Cache-Control", "no-store");
        request.set_header("Last-Event-ID", last_id);

        EventStream::pending(
            Arc::clone(&self.shared),
            Arc::clone(&self.transport),
            request,
            self.mode,
        )
    }

    /// Tear the connection down. Idempotent from any state; at most one
    /// `Closed` item is ever delivered.
    pub fn cancel(&self) {
        self.shared.close();
    }

    /// Current lifecycle state.
    pub fn ready_state(&self) -> ReadyState {
        self.shared.lock().state
    }

    /// Id of the last event that carried one. Still readable after the
    /// stream terminates, as the resumption cursor for a new connection.
    pub fn last_event_id(&self) -> Option<String> {
        self.shared.lock().last_event_id.clone()
    }
}

enum StreamState {
    /// Not yet polled; the request has not been issued.
    Pending {
        shared: Arc<Shared>,
        transport: Arc<dyn Transport>,
        request: Request,
        mode: ParseMode,
    },
    /// Producer task running; items arrive over the channel.
    Live {
        shared: Arc<Shared>,
        rx: UnboundedReceiver<StreamItem>,
    },
    /// Fixed item sequence with no connection behind it.
    Scripted { queue: VecDeque<StreamItem> },
    /// Fully drained.
    Finished,
}

/// Single-consumer output sequence of an [`EventSource`].
///
/// Dropping the stream cancels the underlying connection.
pub struct EventStream {
    state: StreamState,
}

impl EventStream {
    fn pending(
        shared: Arc<Shared>,
        transport: Arc<dyn Transport>,
        request: Request,
        mode: ParseMode,
    ) -> Self {
        Self {
            state: StreamState::Pending {
                shared,
                transport,
                request,
                mode,
            },
        }
    }

    fn scripted(items: Vec<StreamItem>) -> Self {
        Self {
            state: StreamState::Scripted {
                queue: VecDeque::from(items),
            },
        }
    }

    /// Install the hand-off channel and spawn the producer task. Returns
    /// `None` when the source was cancelled before ever starting.
    fn start(
        shared: &Arc<Shared>,
        transport: Arc<dyn Transport>,
        request: Request,
        mode: ParseMode,
    ) -> Option<UnboundedReceiver<StreamItem>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = shared.lock();
        if inner.state == ReadyState::Closed {
            return None;
        }
        inner.state = ReadyState::Connecting;
        inner.tx = Some(tx);
        let handle = tokio::spawn(run(Arc::clone(shared), transport, request, mode));
        inner.abort = Some(handle.abort_handle());
        Some(rx)
    }
}

impl Stream for EventStream {
    type Item = StreamItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        // Lazy start: the first poll is what triggers the network request.
        if let StreamState::Pending { .. } = this.state {
            if let StreamState::Pending {
                shared,
                transport,
                request,
                mode,
            } = std::mem::replace(&mut this.state, StreamState::Finished)
            {
                this.state = match EventStream::start(&shared, transport, request, mode) {
                    Some(rx) => StreamState::Live { shared, rx },
                    // Cancelled before the first poll: just report the close.
                    None => StreamState::Scripted {
                        queue: VecDeque::from([StreamItem::Closed]),
                    },
                };
            }
        }

        match &mut this.state {
            StreamState::Live { rx, .. } => match ready!(rx.poll_recv(cx)) {
                Some(item) => Poll::Ready(Some(item)),
                None => {
                    this.state = StreamState::Finished;
                    Poll::Ready(None)
                }
            },
            StreamState::Scripted { queue } => match queue.pop_front() {
                Some(item) => Poll::Ready(Some(item)),
                None => {
                    this.state = StreamState::Finished;
                    Poll::Ready(None)
                }
            },
            StreamState::Finished => Poll::Ready(None),
            StreamState::Pending { .. } => unreachable!("pending state resolved above"),
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        match &self.state {
            StreamState::Pending { shared, .. } | StreamState::Live { shared, .. } => {
                shared.close();
            }
            StreamState::Scripted { .. } | StreamState::Finished => {}
        }
    }
}

/// Drive one connection attempt: issue the request, classify the status,
/// and pump body chunks through the parser into the hand-off channel.
async fn run(
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    request: Request,
    mode: ParseMode,
) {
    debug!(url = %request.url, "opening event stream");
    let response = match transport.send(&request).await {
        Ok(response) => response,
        Err(err) => {
            shared.fail(Error::transport(err));
            return;
        }
    };
    let status = response.status;
    let mut body = response.body;

    // 204 is a graceful immediate close: no open, no error.
    if status == 204 {
        debug!("server returned 204, closing stream");
        shared.close();
        return;
    }

    if !(200..300).contains(&status) {
        // Providers deliver the error payload in the body after non-success
        // headers. Accumulate everything the server sends before reporting;
        // the chunks are never fed to the parser.
        warn!(status, "event stream request failed");
        let mut payload = Vec::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => payload.extend_from_slice(&bytes),
                Err(_) => break,
            }
        }
        shared.fail(Error::connection(status, payload));
        return;
    }

    shared.emit(StreamItem::Open);
    let mut parser = Parser::new(mode);
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                for event in parser.push(&bytes) {
                    deliver(&shared, event);
                }
            }
            Err(err) => {
                shared.fail(Error::transport(err));
                return;
            }
        }
    }
    if let Some(event) = parser.finish() {
        deliver(&shared, event);
    }
    debug!("event stream finished");
    shared.close();
}

fn deliver(shared: &Shared, event: Event) {
    if let Some(id) = &event.id {
        shared.record_last_id(id);
    }
    shared.emit(StreamItem::Event(event));
}
