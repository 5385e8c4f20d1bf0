//! Transport boundary.
//!
//! The connection never touches the network itself. A [`Transport`] opens an
//! event stream for a URL and returns a [`TransportHandle`], which yields
//! [`TransportSignal`]s until it is terminated. Retry and buffering policy
//! stay in the connection; a transport only reports what happened.
//!
//! [`ChannelTransport`] bridges any producer into a connection through tokio
//! channels.

use futures_util::Stream;

use crate::error::TransportError;
use crate::message::RawEvent;

mod channel;

pub use channel::{ChannelHandle, ChannelTransport, OpenedStream, SignalSender, TransportController};

/// A low-level signal from an open stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// The stream was established.
    Opened,
    /// A complete event was parsed.
    Message(RawEvent),
    /// The stream failed. A handle whose stream ends reports
    /// [`TransportError::StreamAborted`] the same way.
    Error(TransportError),
}

/// Opens event streams.
pub trait Transport {
    /// Handle to one opened stream.
    type Handle: TransportHandle;

    /// Start opening a stream to `url`.
    ///
    /// `last_event_id` is the id of the last event the connection received,
    /// for the `Last-Event-ID` request header. Failures are reported through
    /// the returned handle, not here.
    fn open(
        &mut self,
        url: &str,
        with_credentials: bool,
        last_event_id: Option<&str>,
    ) -> Self::Handle;
}

/// One opened stream.
pub trait TransportHandle: Stream<Item = TransportSignal> + Unpin {
    /// Stop the stream and release its resources.
    fn terminate(&mut self);
}
