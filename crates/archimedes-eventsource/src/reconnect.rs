//! Bounded automatic reconnection.
//!
//! The controller decides whether a failed connection gets another attempt
//! and owns the timer for that attempt. Dropping the timer cancels the
//! attempt.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep};

use crate::config::ConnectionConfig;

/// A pending reconnection attempt.
#[derive(Debug)]
pub struct RetryTimer {
    sleep: Pin<Box<Sleep>>,
    attempt: u32,
}

impl RetryTimer {
    /// Arm a timer for `attempt` that fires after `delay`.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(delay: Duration, attempt: u32) -> Self {
        Self {
            sleep: Box::pin(tokio::time::sleep(delay)),
            attempt,
        }
    }

    /// When the attempt becomes due.
    pub fn deadline(&self) -> Instant {
        self.sleep.deadline()
    }

    /// The attempt number this timer was armed for.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Outcome of reporting a failure to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// A new attempt was armed.
    Scheduled {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Wait before the attempt.
        delay: Duration,
    },
    /// An attempt is already waiting; nothing was armed.
    AlreadyPending,
    /// The retry budget is spent.
    Exhausted,
    /// Automatic reconnection is not enabled.
    Disabled,
}

/// Retry bookkeeping for one connection.
#[derive(Debug)]
pub struct ReconnectController {
    enabled: bool,
    retry_count: u32,
    max_retries: u32,
    interval: Duration,
    timer: Option<RetryTimer>,
}

impl ReconnectController {
    /// Create a disabled controller using the limits in `config`.
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            enabled: false,
            retry_count: 0,
            max_retries: config.max_retries,
            interval: config.reconnect_interval(),
            timer: None,
        }
    }

    /// Turn automatic reconnection on.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Check if automatic reconnection is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Attempts made since the last successful open.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Check if an attempt is waiting on its timer.
    pub fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    /// The pending timer, if any.
    pub fn pending(&self) -> Option<&RetryTimer> {
        self.timer.as_ref()
    }

    /// Report a failure and arm the next attempt if the budget allows.
    pub fn on_error(&mut self) -> RetryDecision {
        if !self.enabled {
            return RetryDecision::Disabled;
        }
        if self.timer.is_some() {
            return RetryDecision::AlreadyPending;
        }
        if self.retry_count >= self.max_retries {
            return RetryDecision::Exhausted;
        }

        self.retry_count += 1;
        self.timer = Some(RetryTimer::new(self.interval, self.retry_count));
        RetryDecision::Scheduled {
            attempt: self.retry_count,
            delay: self.interval,
        }
    }

    /// Report a successful open, restoring the full budget.
    pub fn on_open(&mut self) {
        self.retry_count = 0;
    }

    /// Drop the pending attempt. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.timer.take().is_some()
    }

    /// Cancel any pending attempt and restore the full budget.
    pub fn reset(&mut self) {
        self.cancel();
        self.retry_count = 0;
    }

    /// Wait for the pending attempt to become due and return its number.
    ///
    /// Never completes while nothing is pending. Dropping the future before
    /// it completes leaves the attempt pending.
    pub async fn due(&mut self) -> u32 {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.sleep.as_mut().await;
                let attempt = timer.attempt;
                self.timer = None;
                attempt
            }
            None => std::future::pending().await,
        }
    }
}
