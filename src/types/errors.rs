//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation. Failures
//! that carry a message produced on the other side of a context boundary
//! (`TransportDelivery`, `Application`) display that message verbatim so a
//! caller sees the same text whichever route the call took.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for cross-context calls.
#[derive(Error, Debug)]
pub enum Error {
    /// The message failed its own self-check. Nothing was sent.
    #[error("validation error: {0}")]
    Validation(String),

    /// No usable native transport and no reachable relay.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The native transport reported a delivery-level failure.
    #[error("{0}")]
    TransportDelivery(String),

    /// The round trip completed but produced no result.
    #[error("empty result")]
    EmptyResult,

    /// The callee answered with an explicit error string.
    #[error("{0}")]
    Application(String),

    /// Call deadline elapsed before a matching result arrived.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The caller shut down while the call was outstanding.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// A peer broke the relay protocol (e.g. envelope without correlation id).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A port already has a handler.
    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Stable error code, used in logs and by the demo binary.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "INVALID_ARGUMENT",
            Error::TransportUnavailable(_) => "UNAVAILABLE",
            Error::TransportDelivery(_) => "DELIVERY_FAILED",
            Error::EmptyResult => "EMPTY_RESULT",
            Error::Application(_) => "APPLICATION",
            Error::Timeout(_) => "DEADLINE_EXCEEDED",
            Error::Cancelled(_) => "CANCELLED",
            Error::ProtocolViolation(_) => "PROTOCOL_VIOLATION",
            Error::AlreadyRegistered(_) => "ALREADY_EXISTS",
            Error::Serialization(_) => "INTERNAL",
        }
    }

    /// Text to place in the `error` field of a relayed result.
    ///
    /// Messages that originated remotely are passed through untouched so the
    /// proxied caller rebuilds an identical error.
    pub fn to_result_message(&self) -> String {
        match self {
            Error::TransportDelivery(msg) | Error::Application(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transport_unavailable(msg: impl Into<String>) -> Self {
        Self::TransportUnavailable(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::TransportDelivery(msg.into())
    }

    pub fn application(msg: impl Into<String>) -> Self {
        Self::Application(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn protocol_violation(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    pub fn already_registered(msg: impl Into<String>) -> Self {
        Self::AlreadyRegistered(msg.into())
    }
}
