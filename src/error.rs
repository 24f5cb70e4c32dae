//! Error types for the feed client.

use thiserror::Error;

/// Main error type for feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Session establishment failed. Writes and subscription stay disabled
    /// until a session is established.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The realtime channel failed. The feed freezes at its last good state.
    #[error("Subscription channel failed: {0}")]
    Subscription(String),

    /// The submission was rejected before any remote effect.
    #[error("Invalid submission: {0}")]
    Validation(String),

    /// A prior submission has not resolved yet. Rejected, never queued.
    #[error("A submission is already in flight")]
    Busy,

    /// The backend rejected a write. `text` preserves the caller's original
    /// input so it can be retried.
    #[error("Remote write rejected: {message}")]
    RemoteWrite { message: String, text: String },
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
