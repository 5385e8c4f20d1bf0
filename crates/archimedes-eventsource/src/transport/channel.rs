//! Channel-backed transport.
//!
//! Every [`ChannelTransport::open`] creates a fresh signal channel and
//! announces it on the [`TransportController`]. Whoever holds the controller
//! (an HTTP reader task, a test) pushes signals through the
//! [`SignalSender`] of each [`OpenedStream`].

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use super::{Transport, TransportHandle, TransportSignal};
use crate::error::TransportError;
use crate::message::RawEvent;

/// Transport whose streams are fed through channels.
///
/// # Example
///
/// ```
/// use archimedes_eventsource::transport::{ChannelTransport, Transport};
///
/// let (mut transport, mut controller) = ChannelTransport::new();
/// let _handle = transport.open("https://example.test/events", false, Some("7"));
///
/// let opened = controller.try_next_open().unwrap();
/// assert_eq!(opened.url(), "https://example.test/events");
/// assert_eq!(opened.last_event_id(), Some("7"));
/// assert!(opened.sender().opened());
/// ```
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    opened_tx: mpsc::UnboundedSender<OpenedStream>,
}

impl ChannelTransport {
    /// Create a transport and the controller that observes its streams.
    pub fn new() -> (Self, TransportController) {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        (Self { opened_tx }, TransportController { opened_rx })
    }
}

impl Transport for ChannelTransport {
    type Handle = ChannelHandle;

    fn open(
        &mut self,
        url: &str,
        with_credentials: bool,
        last_event_id: Option<&str>,
    ) -> ChannelHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let terminations = Arc::new(AtomicUsize::new(0));

        let opened = OpenedStream {
            url: url.to_string(),
            with_credentials,
            last_event_id: last_event_id.map(str::to_string),
            sender: SignalSender {
                tx,
                terminations: Arc::clone(&terminations),
            },
        };
        if self.opened_tx.send(opened).is_err() {
            debug!(url, "transport controller dropped, stream will end immediately");
        }

        ChannelHandle {
            rx,
            terminations,
            terminated: false,
        }
    }
}

/// Receives the streams opened through a [`ChannelTransport`].
#[derive(Debug)]
pub struct TransportController {
    opened_rx: mpsc::UnboundedReceiver<OpenedStream>,
}

impl TransportController {
    /// Wait for the next stream to be opened.
    pub async fn next_open(&mut self) -> Option<OpenedStream> {
        self.opened_rx.recv().await
    }

    /// Take the next opened stream if one is waiting.
    pub fn try_next_open(&mut self) -> Option<OpenedStream> {
        self.opened_rx.try_recv().ok()
    }
}

/// A stream that a connection asked to open.
#[derive(Debug)]
pub struct OpenedStream {
    url: String,
    with_credentials: bool,
    last_event_id: Option<String>,
    sender: SignalSender,
}

impl OpenedStream {
    /// URL the stream was opened for.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether credentials were requested.
    pub fn with_credentials(&self) -> bool {
        self.with_credentials
    }

    /// Last event id the connection had received, if any.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Sender feeding this stream.
    pub fn sender(&self) -> &SignalSender {
        &self.sender
    }

    /// Take the sender, dropping the request metadata.
    pub fn into_sender(self) -> SignalSender {
        self.sender
    }
}

/// Pushes signals into one [`ChannelHandle`].
///
/// Dropping the sender ends the stream, which the connection treats as an
/// aborted stream.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<TransportSignal>,
    terminations: Arc<AtomicUsize>,
}

impl SignalSender {
    /// Report that the stream is established.
    pub fn opened(&self) -> bool {
        self.send(TransportSignal::Opened)
    }

    /// Report a parsed event.
    pub fn message(&self, event: RawEvent) -> bool {
        self.send(TransportSignal::Message(event))
    }

    /// Report a failure.
    pub fn error(&self, error: TransportError) -> bool {
        self.send(TransportSignal::Error(error))
    }

    /// Push a raw signal. Returns `false` if the handle is gone.
    pub fn send(&self, signal: TransportSignal) -> bool {
        self.tx.send(signal).is_ok()
    }

    /// Check if the connection terminated this stream.
    pub fn is_terminated(&self) -> bool {
        self.terminate_count() > 0
    }

    /// How many times `terminate` was called on the handle.
    pub fn terminate_count(&self) -> usize {
        self.terminations.load(Ordering::Acquire)
    }
}

/// Handle returned by [`ChannelTransport::open`].
#[derive(Debug)]
pub struct ChannelHandle {
    rx: mpsc::UnboundedReceiver<TransportSignal>,
    terminations: Arc<AtomicUsize>,
    terminated: bool,
}

impl Stream for ChannelHandle {
    type Item = TransportSignal;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

impl TransportHandle for ChannelHandle {
    fn terminate(&mut self) {
        self.terminations.fetch_add(1, Ordering::AcqRel);
        self.terminated = true;
        self.rx.close();
    }
}
