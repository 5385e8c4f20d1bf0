//! # Archimedes EventSource
//!
//! Client-side Server-Sent Events (SSE) connection management for the
//! Archimedes platform.
//!
//! This crate manages one upstream event stream per [`SseConnection`]: it
//! tracks the connection lifecycle, dispatches incoming events to handlers
//! registered by event name, and re-opens the stream after failures within a
//! bounded retry budget.
//!
//! ## Features
//!
//! - **Lifecycle State**: `Connecting`, `Open`, `Closed` and `Error`, queried
//!   without side effects
//! - **Named Handlers**: Per-event handler lists, run in registration order
//! - **Auto-Reconnect**: Opt-in, fixed interval, bounded by `max_retries`,
//!   budget renewed on every successful open
//! - **Fluent API**: Every mutator returns the same connection
//! - **Pluggable Transport**: Networking and SSE framing live behind the
//!   [`Transport`](transport::Transport) trait
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use archimedes_eventsource::prelude::*;
//! use archimedes_eventsource::transport::ChannelTransport;
//!
//! # async fn example() -> SseResult<()> {
//! let (transport, _controller) = ChannelTransport::new();
//! let config = ConnectionConfig::new("https://example.test/events")
//!     .with_reconnect_interval(Duration::from_secs(1))
//!     .with_max_retries(5);
//!
//! let mut conn = SseConnection::connect_with_config(transport, config)?;
//! conn.on_open(StateHandler::new(|state| println!("stream {state}")))
//!     .on("update", MessageHandler::new(|msg| println!("update: {}", msg.data())))
//!     .on_error(ErrorHandler::new(|err| eprintln!("stream failed: {err}")))
//!     .setup_auto_reconnect();
//!
//! conn.run().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## SSE Framing
//!
//! Transports parse the standard text framing before events reach the
//! connection:
//!
//! ```text
//! id: 42
//! event: update
//! data: first line
//! data: second line
//!
//! ```
//!
//! - `id`: Optional event ID, tracked as the last event id
//! - `event`: Event name (default: "message")
//! - `data`: Payload; multiple lines are joined with `\n`
//! - A blank line ends the event

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod connection;
mod error;
mod message;
mod reconnect;
mod registry;
mod state;
pub mod transport;

pub use config::{default_connection_config, ConnectionConfig};
pub use connection::{SseCommand, SseConnection, SseHandle};
pub use error::{SseError, SseResult, TransportError};
pub use message::{RawEvent, SseMessage, DEFAULT_EVENT_NAME};
pub use reconnect::{ReconnectController, RetryDecision, RetryTimer};
pub use registry::{
    ErrorHandler, Handler, HandlerList, HandlerRegistry, MessageHandler, StateHandler,
};
pub use state::EventState;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{default_connection_config, ConnectionConfig};
    pub use crate::connection::{SseConnection, SseHandle};
    pub use crate::error::{SseError, SseResult, TransportError};
    pub use crate::message::SseMessage;
    pub use crate::registry::{ErrorHandler, MessageHandler, StateHandler};
    pub use crate::state::EventState;
}
