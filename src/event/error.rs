//! Error types for event construction, signing and encryption.

use thiserror::Error;

/// Errors that can occur while building, signing or decoding events.
#[derive(Error, Debug)]
pub enum EventError {
    /// Encryption operation failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Decryption operation failed.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Event signing failed.
    #[error("Event signing failed: {0}")]
    Signing(String),

    /// Serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid event structure or content.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Malformed tag.
    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    /// No signer is available for an operation that needs one.
    #[error("No signer available")]
    NoSigner,
}

/// Result type for event operations.
pub type Result<T> = std::result::Result<T, EventError>;
