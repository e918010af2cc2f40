//! Outbox error types.

use thiserror::Error;

/// Why a single delivery attempt did not reach the embedded surface.
///
/// Every variant is recoverable from the channel's point of view: the
/// command is retried until it runs out of attempts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The surface has not signalled that it finished loading.
    #[error("Embedded surface not ready")]
    NotReady,

    /// No transport handle is attached (surface not mounted or torn down).
    #[error("Transport handle unavailable")]
    Unavailable,

    /// The destination origin does not match where the surface actually lives.
    #[error("Origin mismatch: expected {expected}, surface is {actual}")]
    OriginMismatch { expected: String, actual: String },

    /// The transport refused the message.
    #[error("Send rejected: {0}")]
    Rejected(String),

    /// The transport was shut down.
    #[error("Transport closed")]
    Closed,
}

/// Outbox error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// URL could not be parsed
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// URL parsed but has no usable origin
    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload did not serialize to a JSON object
    #[error("Invalid payload: {0}")]
    Payload(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
