//! Error types for relay operations.
//!
//! Most of these never reach the user: the pool treats any per-relay
//! error as "ignore this relay for the current operation" and only
//! surfaces [`RelayError::NoResponse`] when nothing answered at all.

use thiserror::Error;

/// Errors that can occur during relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Connection to relay failed.
    #[error("Failed to connect to relay {url}: {reason}")]
    Connection {
        /// The relay URL that failed.
        url: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Event publishing failed.
    #[error("Failed to publish event: {0}")]
    Publish(String),

    /// Invalid relay URL.
    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),

    /// Relay rejected the event.
    #[error("Relay {relay} rejected event: {reason}")]
    Rejected {
        /// The relay that rejected the event.
        relay: String,
        /// The rejection reason.
        reason: String,
    },

    /// Timeout waiting for operation.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The relay issued a NIP-42 authentication challenge.
    #[error("Relay requires authentication")]
    AuthRequired {
        /// The challenge string to sign.
        challenge: String,
    },

    /// Authentication could not be completed.
    #[error("Authentication with {url} failed: {reason}")]
    AuthFailed {
        /// The relay URL.
        url: String,
        /// The reason for the failure.
        reason: String,
    },

    /// The pool is closed (page hidden or session disposed).
    #[error("Relay pool is closed")]
    PoolClosed,

    /// No relay answered before the timeout.
    #[error("No relay responded")]
    NoResponse,

    /// Initialization failed.
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Event fetch failed.
    #[error("Failed to fetch events: {0}")]
    Fetch(String),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_display() {
        let error = RelayError::Connection {
            url: "wss://relay.example.com".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to connect to relay wss://relay.example.com: connection refused"
        );
    }

    #[test]
    fn publish_error_display() {
        let error = RelayError::Publish("rate limited".to_string());
        assert_eq!(error.to_string(), "Failed to publish event: rate limited");
    }

    #[test]
    fn invalid_url_error_display() {
        let error = RelayError::InvalidUrl("ws://insecure".to_string());
        assert_eq!(error.to_string(), "Invalid relay URL: ws://insecure");
    }

    #[test]
    fn rejected_error_display() {
        let error = RelayError::Rejected {
            relay: "wss://relay.example.com".to_string(),
            reason: "blocked".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Relay wss://relay.example.com rejected event: blocked"
        );
    }

    #[test]
    fn timeout_error_display() {
        let error = RelayError::Timeout("event publish".to_string());
        assert_eq!(error.to_string(), "Operation timed out: event publish");
    }

    #[test]
    fn auth_required_hides_challenge() {
        let error = RelayError::AuthRequired {
            challenge: "c-123".to_string(),
        };
        assert_eq!(error.to_string(), "Relay requires authentication");
    }

    #[test]
    fn auth_failed_error_display() {
        let error = RelayError::AuthFailed {
            url: "wss://private.example.com".to_string(),
            reason: "no signer available".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Authentication with wss://private.example.com failed: no signer available"
        );
    }

    #[test]
    fn pool_closed_error_display() {
        assert_eq!(RelayError::PoolClosed.to_string(), "Relay pool is closed");
    }

    #[test]
    fn no_response_error_display() {
        assert_eq!(RelayError::NoResponse.to_string(), "No relay responded");
    }

    #[test]
    fn fetch_error_display() {
        let error = RelayError::Fetch("connection reset".to_string());
        assert_eq!(
            error.to_string(),
            "Failed to fetch events: connection reset"
        );
    }

    #[test]
    fn error_debug_format() {
        let error = RelayError::PoolClosed;
        let debug_str = format!("{error:?}");
        assert!(debug_str.contains("PoolClosed"));
    }
}
