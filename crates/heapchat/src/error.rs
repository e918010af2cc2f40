//! Widget error types.

use heapchat_outbox::OutboxError;
use thiserror::Error;

/// Widget error type.
///
/// Only construction and parsing return errors. Command calls on a live
/// widget never fail; delivery problems surface as logs and delivery events.
#[derive(Error, Debug)]
pub enum WidgetError {
    /// A widget is already active in this registry
    #[error("Heapchat widget already initialized")]
    AlreadyInitialized,

    /// The host could not mount or drive the embedded surface
    #[error("Host error: {0}")]
    Host(String),

    /// Outbound channel error
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    /// Widget creation needs a tokio runtime for the load watcher
    #[error("No async runtime available")]
    NoRuntime,

    /// A string did not name a known value
    #[error("Invalid {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },
}

/// Result type alias using WidgetError.
pub type WidgetResult<T> = Result<T, WidgetError>;
