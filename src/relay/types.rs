//! Types for relay configuration, status and publish results.

use nostr::{EventId, RelayUrl};

/// Default relay URLs used before the user's own relay list is known.
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.primal.net",
];

/// A configured relay as seen by the routers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Relay {
    /// The relay URL.
    pub url: RelayUrl,
    /// Whether reads may be sent to this relay.
    pub read: bool,
    /// Whether writes may be sent to this relay.
    pub write: bool,
    /// Whether the user flagged this relay as trusted and restricted-access.
    pub is_private: bool,
}

impl Relay {
    /// Creates a public read/write relay.
    #[must_use]
    pub fn new(url: RelayUrl) -> Self {
        Self {
            url,
            read: true,
            write: true,
            is_private: false,
        }
    }

    /// Marks this relay private.
    #[must_use]
    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }

    /// Sets the read and write flags.
    #[must_use]
    pub fn with_access(mut self, read: bool, write: bool) -> Self {
        self.read = read;
        self.write = write;
        self
    }
}

/// Connection status for a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayStatus {
    /// Not connected to the relay.
    Disconnected,

    /// Connected and ready.
    Connected,

    /// Connection failed.
    Failed {
        /// The reason for the failure.
        reason: String,
    },
}

/// Status of a single relay connection.
#[derive(Debug, Clone)]
pub struct RelayConnectionStatus {
    /// The relay URL.
    pub url: String,
    /// Current connection status.
    pub status: RelayStatus,
    /// Last time the relay answered (Unix timestamp).
    pub last_seen: Option<i64>,
}

/// Host page visibility, which drives the pool lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Foregrounded: the pool is open.
    Visible,
    /// Backgrounded: the pool is torn down.
    Hidden,
}

/// Result of publishing an event to relays.
#[derive(Debug, Clone)]
pub struct PublishResult {
    /// The event ID that was published.
    pub event_id: EventId,
    /// Relays that accepted the event.
    pub accepted_by: Vec<String>,
    /// Relays that rejected the event (with reasons).
    pub rejected_by: Vec<(String, String)>,
    /// Relays that failed to respond.
    pub failed: Vec<String>,
}

impl PublishResult {
    /// Creates a result with no attempted relays.
    #[must_use]
    pub const fn empty(event_id: EventId) -> Self {
        Self {
            event_id,
            accepted_by: Vec::new(),
            rejected_by: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Returns true if at least one relay accepted the event.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !self.accepted_by.is_empty()
    }

    /// Returns the number of successful relays.
    #[must_use]
    pub const fn success_count(&self) -> usize {
        self.accepted_by.len()
    }

    /// Returns the total number of relays attempted.
    #[must_use]
    pub const fn total_attempted(&self) -> usize {
        self.accepted_by.len() + self.rejected_by.len() + self.failed.len()
    }
}
