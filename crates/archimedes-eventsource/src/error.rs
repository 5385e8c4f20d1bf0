//! Error types for SSE client connections.

use thiserror::Error;

/// Result type for SSE connection operations.
pub type SseResult<T> = Result<T, SseError>;

/// Errors raised synchronously by the connection API.
#[derive(Debug, Error)]
pub enum SseError {
    /// The URL is empty or not an absolute http(s) URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A message payload could not be decoded.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The connection behind a control handle is gone.
    #[error("connection closed: {0}")]
    Closed(String),
}

impl SseError {
    /// Create an invalid url error.
    pub fn invalid_url(reason: impl Into<String>) -> Self {
        Self::InvalidUrl(reason.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Create a deserialization error.
    pub fn deserialization(reason: impl Into<String>) -> Self {
        Self::Deserialization(reason.into())
    }

    /// Create a closed error.
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed(reason.into())
    }

    /// Check if this error was caused by the caller's configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidUrl(_) | Self::InvalidConfig(_))
    }
}

/// Failure reported by a transport, delivered to error handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The network request failed or the connection dropped.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The event stream ended without being closed by the client.
    #[error("stream aborted")]
    StreamAborted,

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Unknown(String),
}

impl TransportError {
    /// Create a network failure.
    pub fn network(reason: impl Into<String>) -> Self {
        Self::NetworkFailure(reason.into())
    }

    /// Create an unclassified failure.
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self::Unknown(reason.into())
    }

    /// Check if this is a network failure.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::NetworkFailure(_))
    }
}
