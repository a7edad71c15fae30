//! Sync state machine types.

use std::time::Duration;

use nostr::{PublicKey, Timestamp};
use serde::{Deserialize, Serialize};

/// Default wait for the user's relay list before syncing anyway.
pub const DEFAULT_RELAY_LIST_WAIT: Duration = Duration::from_secs(3);
/// Default network timeout for an account with nothing cached.
pub const DEFAULT_FRESH_ACCOUNT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default network timeout when data is cached or the signer is remote.
pub const DEFAULT_EXTENDED_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a login sync currently is.
///
/// ```text
/// Idle -> CacheChecking -> GatedOnRelayList -> NetworkSyncing -> Synced
///   ^                                                              |
///   +----------------------- logout / switch ----------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// No session.
    Idle,
    /// Reading the local cache.
    CacheChecking,
    /// Waiting for the relay list so reads go to the right relays.
    GatedOnRelayList,
    /// Batched network fetch in flight.
    NetworkSyncing,
    /// Done, from the network or from the cache after a fallback.
    Synced,
}

/// Per-session sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    /// The logged-in user.
    pub pubkey: PublicKey,
    /// Whether the relay list load has completed for this session.
    pub relay_list_loaded: bool,
    /// When the last network sync finished.
    pub last_synced_at: Option<Timestamp>,
}

impl SyncState {
    /// Fresh state for a new session.
    #[must_use]
    pub const fn new(pubkey: PublicKey) -> Self {
        Self {
            pubkey,
            relay_list_loaded: false,
            last_synced_at: None,
        }
    }
}

/// Network timeouts used by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTimeouts {
    /// How long to wait for the relay list gate.
    pub relay_list_wait: Duration,
    /// Fetch timeout when nothing is cached and signing is local.
    pub fresh_account: Duration,
    /// Fetch timeout otherwise.
    pub extended: Duration,
}

impl Default for SyncTimeouts {
    fn default() -> Self {
        Self {
            relay_list_wait: DEFAULT_RELAY_LIST_WAIT,
            fresh_account: DEFAULT_FRESH_ACCOUNT_TIMEOUT,
            extended: DEFAULT_EXTENDED_TIMEOUT,
        }
    }
}

impl SyncTimeouts {
    /// Picks the network timeout.
    ///
    /// A fresh account with a local signer has probably nothing to fetch,
    /// so it gets the short timeout. Cached data means there is something
    /// worth waiting for, and a remote signer adds round-trips of its own.
    #[must_use]
    pub const fn network_timeout(&self, has_cached_data: bool, remote_signer: bool) -> Duration {
        if has_cached_data || remote_signer {
            self.extended
        } else {
            self.fresh_account
        }
    }
}

/// Outcome of one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncReport {
    /// Events found in the cache at login.
    pub cached_events: usize,
    /// Events fetched from relays (0 when offline).
    pub fetched_events: usize,
    /// Events removed by fetched deletions.
    pub deleted_events: usize,
    /// Whether anything is available to show.
    pub has_any_data: bool,
    /// No relay answered; the cache is all there is.
    pub offline: bool,
    /// The session ended mid-sync and the results were dropped.
    pub discarded: bool,
    /// The network timeout used.
    pub timeout_used: Duration,
}
