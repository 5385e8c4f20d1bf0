//! Connection configuration.
//!
//! A [`ConnectionConfig`] is copied into a connection when it is created and
//! never changes afterwards.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SseError, SseResult};

/// Configuration for an SSE connection.
///
/// # Example
///
/// ```
/// use archimedes_eventsource::ConnectionConfig;
///
/// let config = ConnectionConfig::new("https://example.test/events")
///     .with_credentials(true)
///     .with_max_retries(5);
///
/// assert_eq!(config.reconnect_interval_ms, 3000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Event stream URL.
    pub url: String,

    /// Send cookies and auth headers with the stream request.
    #[serde(default)]
    pub with_credentials: bool,

    /// Delay before an automatic reconnection attempt, in milliseconds.
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,

    /// Maximum automatic reconnection attempts. Zero disables them.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_reconnect_interval() -> u64 {
    3000
}

fn default_max_retries() -> u32 {
    3
}

/// Build the default configuration for `url`.
pub fn default_connection_config(url: impl Into<String>) -> ConnectionConfig {
    ConnectionConfig::new(url)
}

impl ConnectionConfig {
    /// Create a configuration with default settings for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            with_credentials: false,
            reconnect_interval_ms: default_reconnect_interval(),
            max_retries: default_max_retries(),
        }
    }

    /// Set whether credentials accompany the stream request.
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    /// Set the reconnection interval.
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the maximum number of automatic reconnection attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// The reconnection interval as a [`Duration`].
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Whether this configuration permits any automatic reconnection.
    pub fn allows_reconnect(&self) -> bool {
        self.max_retries > 0
    }

    /// Validate the configuration.
    ///
    /// The URL must be an absolute `http` or `https` URL with a host, and the
    /// reconnection interval must be positive.
    pub fn validate(&self) -> SseResult<()> {
        validate_url(&self.url)?;
        if self.reconnect_interval_ms == 0 {
            return Err(SseError::invalid_config("reconnect interval must be > 0"));
        }
        Ok(())
    }
}

fn validate_url(url: &str) -> SseResult<()> {
    if url.trim().is_empty() {
        return Err(SseError::invalid_url("url cannot be empty"));
    }

    let uri: http::Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| SseError::invalid_url(format!("{url}: {e}")))?;

    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(other) => {
            return Err(SseError::invalid_url(format!(
                "{url}: unsupported scheme {other}"
            )));
        }
        None => return Err(SseError::invalid_url(format!("{url}: missing scheme"))),
    }

    match uri.host() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(SseError::invalid_url(format!("{url}: missing host"))),
    }
}
