//! Top-level error type for [`Tracker`](crate::Tracker) operations.

use thiserror::Error;

use crate::event::EventError;
use crate::records::RecordError;
use crate::relay::RelayError;
use crate::store::StoreError;

/// Errors surfaced by the tracker facade.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Relay operation failed.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// Event building, signing or encryption failed.
    #[error(transparent)]
    Event(#[from] EventError),

    /// Record encoding or decoding failed.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// Local storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The operation needs a logged-in user.
    #[error("Not logged in")]
    NotLoggedIn,

    /// Configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
