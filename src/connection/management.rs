//! Reconnection policy primitives
//!
//! This module provides the retry budget, the backoff schedule, disconnection reasons
//! and the counters the session keeps about its own lifecycle.

use std::fmt;
use std::time::Duration;

/// Bounded count of automatic reconnect attempts.
///
/// Attempts are consumed on every unexpected close and given back when the session
/// authenticates successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    max_attempts: u32,
    used: u32,
}

impl RetryBudget {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            used: 0,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempts consumed since the last reset.
    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.max_attempts - self.used
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max_attempts
    }

    /// Consumes one attempt, returning its 1-based number, or `None` when exhausted.
    pub fn try_consume(&mut self) -> Option<u32> {
        if self.is_exhausted() {
            return None;
        }
        self.used += 1;
        Some(self.used)
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }
}

/// Delay schedule between a close and the next automatic attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffPolicy {
    /// Same delay before every attempt.
    Fixed(Duration),
    /// `initial * multiplier^(attempt - 1)`, capped at `max`.
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Fixed(Duration::from_millis(1000))
    }
}

impl BackoffPolicy {
    /// Delay before the given 1-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            BackoffPolicy::Fixed(delay) => *delay,
            BackoffPolicy::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let millis = initial.as_millis() as f64 * multiplier.powi(exponent);
                let capped = millis.min(max.as_millis() as f64);
                Duration::from_millis(capped as u64)
            }
        }
    }

    /// Validates the policy
    pub fn validate(&self) -> Result<(), String> {
        match self {
            BackoffPolicy::Fixed(delay) if delay.is_zero() => {
                Err("backoff delay must be greater than 0".to_string())
            }
            BackoffPolicy::Fixed(_) => Ok(()),
            BackoffPolicy::Exponential {
                initial,
                multiplier,
                max,
            } => {
                if initial.is_zero() {
                    return Err("initial delay must be greater than 0".to_string());
                }
                if *multiplier < 1.0 {
                    return Err("backoff multiplier must be at least 1.0".to_string());
                }
                if max < initial {
                    return Err("max delay must be greater than or equal to initial delay".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Reason the transport went away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectionReason {
    /// Could not establish the transport, or it failed mid-stream
    NetworkError(String),
    /// The server closed the socket
    ServerClosed {
        /// Close code, when the server sent one
        code: Option<u16>,
        /// Close reason text
        reason: String,
    },
    /// The transport stayed in CONNECTING longer than the connect timeout
    ConnectTimeout,
    /// Disconnection was requested by the user
    UserRequested,
}

impl fmt::Display for DisconnectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectionReason::NetworkError(e) => write!(f, "network error: {}", e),
            DisconnectionReason::ServerClosed { code: Some(code), reason } => {
                write!(f, "closed by server ({}): {}", code, reason)
            }
            DisconnectionReason::ServerClosed { code: None, reason } => {
                write!(f, "closed by server: {}", reason)
            }
            DisconnectionReason::ConnectTimeout => f.write_str("connect timeout"),
            DisconnectionReason::UserRequested => f.write_str("requested by user"),
        }
    }
}

/// Session metrics for monitoring and debugging
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionMetrics {
    /// Transports opened, manual and automatic
    pub total_connections: u64,
    /// Automatic reconnect attempts started
    pub reconnect_attempts: u64,
    /// Successful authentications
    pub successful_authentications: u64,
    /// Inbound frames dropped because they were malformed
    pub dropped_frames: u64,
    /// Frames with an unknown discriminator
    pub ignored_frames: u64,
    /// Entity messages handed to the dispatcher
    pub dispatched_messages: u64,
    /// Subscriber errors and panics
    pub subscriber_failures: u64,
}
