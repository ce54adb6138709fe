//! Error handling for the Marstek UDP polling engine
//!
//! A single error enum covers the whole crate; callers decide retry policy
//! based on the variant, the errors themselves carry no policy.

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the transport, scheduler, poller and validator.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// No correlated response arrived before the per-call deadline.
    /// Recoverable: the validator retries, the poller carries stale values.
    #[error("no response to {method} within {after:?}")]
    Timeout {
        method: &'static str,
        after: Duration,
    },

    /// Socket-level failure (bind, send, receive). Fatal for the current
    /// call, recoverable at the next cycle.
    #[error("transport error: {0}")]
    Transport(String),

    /// The device answered with an `error` member instead of a result.
    #[error("device rejected {method}: {detail}")]
    Device {
        method: &'static str,
        detail: String,
    },

    /// A datagram was received but could not be parsed as a response
    /// envelope. The transport drops these and keeps waiting; the variant
    /// exists for the `From<serde_json::Error>` conversion and diagnostics.
    #[error("malformed datagram: {0}")]
    Malformed(String),

    /// Setup-time connectivity validation exhausted its retry budget.
    #[error("device unreachable after {attempts} attempts: {last}")]
    Connect { attempts: u32, last: String },

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for the Marstek UDP engine.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Whether the failure is expected to clear on its own at a later
    /// attempt (timeouts, per-command device rejections, socket hiccups).
    /// The validator retries these and aborts on everything else.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. } | Error::Device { .. } | Error::Transport(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Malformed(err.to_string())
    }
}
