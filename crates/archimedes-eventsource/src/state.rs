//! Connection lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of an SSE connection.
///
/// `Closed` is terminal unless the connection is reconnected by hand. `Error`
/// is not terminal: it is where automatic reconnection starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventState {
    /// The transport has been asked to open the stream.
    Connecting,
    /// The stream is open and delivering events.
    Open,
    /// The connection was closed by the client.
    Closed,
    /// The transport failed or the stream ended unexpectedly.
    Error,
}

impl EventState {
    /// Check if events can currently be received.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the connection was closed by the client.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Check if a transport is currently attached in this state.
    pub fn has_transport(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Error => write!(f, "error"),
        }
    }
}
