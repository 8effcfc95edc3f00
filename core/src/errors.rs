//! Error types for breaker, shaping and session operations

use std::time::Duration;
use thiserror::Error;

use crate::shaping::RuleKind;

/// Errors surfaced by [`Breaker::call`](crate::Breaker::call)
///
/// Only `Open`, `Timeout` and `Cancelled` originate in the breaker itself;
/// everything the wrapped operation returns passes through as `Execution`.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Breaker is open and the retry policy refused a probe
    #[error("breaker '{breaker}' is open")]
    Open { breaker: String },

    /// The operation did not finish within its budget (it keeps running)
    #[error("breaker '{breaker}' timed out after {timeout:?}")]
    Timeout { breaker: String, timeout: Duration },

    /// The spawned operation was cancelled by the runtime
    #[error("breaker '{breaker}' task was cancelled")]
    Cancelled { breaker: String },

    /// The wrapped operation failed
    #[error("{0}")]
    Execution(E),
}

impl<E> BreakerError<E> {
    /// Returns the wrapped error if the operation itself failed
    pub fn into_execution(self) -> Option<E> {
        match self {
            BreakerError::Execution(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }
}

/// Errors surfaced by the traffic shaping pipeline
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapingError {
    /// A controller refused admission
    #[error("rejected by {kind} rule (limit {limit})")]
    Rejected { kind: RuleKind, limit: f64 },

    /// Rule failed validation at pipeline construction
    #[error("invalid rule: {0}")]
    InvalidRule(String),
}

/// Errors surfaced by broker sessions
#[derive(Debug, Error)]
pub enum SessionError {
    /// No live connection/channel pair is available
    #[error("session is not connected")]
    NotConnected,

    /// Session was already closed
    #[error("session is already closed")]
    CloseNotReady,

    /// The channel died while an operation was running on it
    #[error("current channel closed: {0}")]
    ChannelClosed(String),

    /// The connection died while an operation was running on it
    #[error("current connection closed: {0}")]
    ConnectionClosed(String),

    /// The publisher confirm never arrived because the channel went away
    #[error("confirm channel closed")]
    ConfirmChannelClosed,

    /// Publishing was refused by the guarding breaker
    #[error("breaker '{breaker}' is open")]
    BreakerOpen { breaker: String },

    /// Operation does not match the session configuration
    #[error("{0}")]
    Config(String),

    /// Error returned by the broker or the AMQP client
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),
}

impl SessionError {
    /// Infrastructure failures the supervisor recovers from on its own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionError::NotConnected
                | SessionError::ChannelClosed(_)
                | SessionError::ConnectionClosed(_)
                | SessionError::ConfirmChannelClosed
        )
    }
}

/// Errors raised while loading configuration or installing logging
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("logging setup failed: {0}")]
    Logging(String),
}
