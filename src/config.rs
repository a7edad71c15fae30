//! Tracker configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nostr::RelayUrl;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::relay::DEFAULT_RELAYS;
use crate::sync::SyncTimeouts;

/// Configuration for a [`Tracker`](crate::Tracker).
///
/// Every field has a default, so a JSON config only needs the fields it
/// changes.
///
/// # Example
///
/// ```
/// use hearth_core::TrackerConfig;
///
/// let config = TrackerConfig::from_json(r#"{ "extended_timeout_ms": 60000 }"#).unwrap();
/// assert_eq!(config.extended_timeout_ms, 60_000);
/// assert_eq!(config.fresh_account_timeout_ms, 5_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Directory for `events.db`, `settings.db` and Tor state. `None`
    /// keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Relays used until the user's own relay list is known.
    pub default_relays: Vec<String>,
    /// Relay to put first for reads, if any.
    pub caching_relay: Option<String>,
    /// How long login sync waits for the relay list.
    pub relay_list_wait_ms: u64,
    /// Network timeout for a fresh account with a local signer.
    pub fresh_account_timeout_ms: u64,
    /// Network timeout otherwise.
    pub extended_timeout_ms: u64,
    /// Per-relay timeout for ad hoc queries.
    pub query_timeout_ms: u64,
    /// Per-relay timeout for publishing.
    pub publish_timeout_ms: u64,
    /// Route relay traffic through embedded Tor.
    pub use_tor: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let sync = SyncTimeouts::default();
        Self {
            data_dir: None,
            default_relays: DEFAULT_RELAYS.iter().map(ToString::to_string).collect(),
            caching_relay: None,
            relay_list_wait_ms: millis(sync.relay_list_wait),
            fresh_account_timeout_ms: millis(sync.fresh_account),
            extended_timeout_ms: millis(sync.extended),
            query_timeout_ms: 10_000,
            publish_timeout_ms: 10_000,
            use_tor: false,
        }
    }
}

impl TrackerConfig {
    /// Default configuration, kept in memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TrackerError::InvalidConfig(e.to_string()))
    }

    /// Persists data under `dir`.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Replaces the default relays.
    #[must_use]
    pub fn with_default_relays(mut self, relays: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.default_relays = relays.into_iter().map(Into::into).collect();
        self
    }

    /// Nominates a caching relay.
    #[must_use]
    pub fn with_caching_relay(mut self, relay: impl Into<String>) -> Self {
        self.caching_relay = Some(relay.into());
        self
    }

    /// Sets the login sync timeouts.
    #[must_use]
    pub const fn with_sync_timeouts(mut self, timeouts: SyncTimeouts) -> Self {
        self.relay_list_wait_ms = millis(timeouts.relay_list_wait);
        self.fresh_account_timeout_ms = millis(timeouts.fresh_account);
        self.extended_timeout_ms = millis(timeouts.extended);
        self
    }

    /// Enables or disables embedded Tor.
    #[must_use]
    pub const fn with_tor(mut self, enabled: bool) -> Self {
        self.use_tor = enabled;
        self
    }

    /// Login sync timeouts.
    #[must_use]
    pub const fn sync_timeouts(&self) -> SyncTimeouts {
        SyncTimeouts {
            relay_list_wait: Duration::from_millis(self.relay_list_wait_ms),
            fresh_account: Duration::from_millis(self.fresh_account_timeout_ms),
            extended: Duration::from_millis(self.extended_timeout_ms),
        }
    }

    /// Ad hoc query timeout.
    #[must_use]
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Publish timeout.
    #[must_use]
    pub const fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    /// Parses the default relays.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first URL that does not parse.
    pub fn default_relay_urls(&self) -> Result<Vec<RelayUrl>> {
        self.default_relays.iter().map(|s| parse_url(s)).collect()
    }

    /// Parses the caching relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse.
    pub fn caching_relay_url(&self) -> Result<Option<RelayUrl>> {
        self.caching_relay.as_deref().map(parse_url).transpose()
    }
}

fn parse_url(raw: &str) -> Result<RelayUrl> {
    RelayUrl::parse(raw).map_err(|e| TrackerError::InvalidConfig(format!("{raw}: {e}")))
}

#[allow(clippy::cast_possible_truncation)]
const fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}
