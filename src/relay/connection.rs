//! A single logical connection to one relay.
//!
//! The wire protocol itself lives behind [`RelayTransport`]: send a set of
//! filters and get back every stored match up to end-of-stored-events,
//! send a signed event, answer an AUTH challenge. [`RelayConnection`] adds
//! lazy opening, status bookkeeping and the NIP-42 challenge/response
//! dance on top.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use nostr::{Event, EventBuilder, Filter, RelayUrl};
use tracing::{debug, warn};

use super::error::{RelayError, RelayResult};
use super::types::{RelayConnectionStatus, RelayStatus};
use crate::event::Signer;

/// Wire-level access to one relay.
///
/// Implementations report an authentication challenge by returning
/// [`RelayError::AuthRequired`] from `fetch` or `send`.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Opens the underlying socket.
    async fn open(&self) -> RelayResult<()>;

    /// Returns stored events matching any of `filters`, stopping at EOSE
    /// or after `timeout`.
    async fn fetch(&self, filters: &[Filter], timeout: Duration) -> RelayResult<Vec<Event>>;

    /// Sends a signed event for storage.
    async fn send(&self, event: &Event) -> RelayResult<()>;

    /// Sends a signed NIP-42 authentication event.
    async fn authenticate(&self, auth: &Event) -> RelayResult<()>;

    /// Closes the underlying socket.
    async fn close(&self);
}

/// Factory for relay transports.
pub trait RelayConnector: Send + Sync {
    /// Creates a transport for `url`. The transport is not opened yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not acceptable to this connector.
    fn connect(&self, url: &RelayUrl) -> RelayResult<Arc<dyn RelayTransport>>;
}

/// A lazily-opened connection to one relay.
pub struct RelayConnection {
    url: RelayUrl,
    transport: Arc<dyn RelayTransport>,
    opened: tokio::sync::Mutex<bool>,
    status: Mutex<RelayConnectionStatus>,
}

impl RelayConnection {
    /// Wraps a transport. Nothing is opened until the first operation.
    #[must_use]
    pub fn new(url: RelayUrl, transport: Arc<dyn RelayTransport>) -> Self {
        let status = RelayConnectionStatus {
            url: url.to_string(),
            status: RelayStatus::Disconnected,
            last_seen: None,
        };
        Self {
            url,
            transport,
            opened: tokio::sync::Mutex::new(false),
            status: Mutex::new(status),
        }
    }

    /// The relay URL.
    #[must_use]
    pub const fn url(&self) -> &RelayUrl {
        &self.url
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> RelayConnectionStatus {
        self.status
            .lock()
            .map(|status| status.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Fetches stored events, authenticating once if challenged.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay cannot be reached, authentication
    /// fails, or the fetch itself fails.
    pub async fn fetch(
        &self,
        filters: &[Filter],
        timeout: Duration,
        signer: Option<&dyn Signer>,
    ) -> RelayResult<Vec<Event>> {
        self.ensure_open().await?;

        let result = match self.transport.fetch(filters, timeout).await {
            Err(RelayError::AuthRequired { challenge }) => {
                self.authenticate(&challenge, signer).await?;
                self.transport.fetch(filters, timeout).await
            }
            other => other,
        };

        self.record(&result);
        result
    }

    /// Sends an event, authenticating once if challenged.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay cannot be reached, authentication
    /// fails, or the relay rejects the event.
    pub async fn send(&self, event: &Event, signer: Option<&dyn Signer>) -> RelayResult<()> {
        self.ensure_open().await?;

        let result = match self.transport.send(event).await {
            Err(RelayError::AuthRequired { challenge }) => {
                self.authenticate(&challenge, signer).await?;
                self.transport.send(event).await
            }
            other => other,
        };

        self.record(&result);
        result
    }

    /// Closes the connection if it was opened.
    pub async fn close(&self) {
        let mut opened = self.opened.lock().await;
        if *opened {
            self.transport.close().await;
            *opened = false;
        }
        drop(opened);
        self.set_status(RelayStatus::Disconnected, None);
    }

    async fn ensure_open(&self) -> RelayResult<()> {
        let mut opened = self.opened.lock().await;
        if !*opened {
            if let Err(e) = self.transport.open().await {
                self.set_status(
                    RelayStatus::Failed {
                        reason: e.to_string(),
                    },
                    None,
                );
                return Err(e);
            }
            debug!(relay = %self.url, "relay connection opened");
            *opened = true;
        }
        Ok(())
    }

    async fn authenticate(&self, challenge: &str, signer: Option<&dyn Signer>) -> RelayResult<()> {
        let auth_failed = |reason: String| RelayError::AuthFailed {
            url: self.url.to_string(),
            reason,
        };

        let Some(signer) = signer else {
            warn!(relay = %self.url, "authentication requested but no signer available");
            return Err(auth_failed("no signer available".to_string()));
        };

        let pubkey = signer
            .public_key()
            .await
            .map_err(|e| auth_failed(e.to_string()))?;
        let unsigned = EventBuilder::auth(challenge, self.url.clone()).build(pubkey);
        let auth = signer
            .sign_event(unsigned)
            .await
            .map_err(|e| auth_failed(e.to_string()))?;

        self.transport.authenticate(&auth).await?;
        debug!(relay = %self.url, "authenticated");
        Ok(())
    }

    fn record<T>(&self, result: &RelayResult<T>) {
        match result {
            Ok(_) => self.set_status(RelayStatus::Connected, Some(Utc::now().timestamp())),
            Err(e) => self.set_status(
                RelayStatus::Failed {
                    reason: e.to_string(),
                },
                None,
            ),
        }
    }

    fn set_status(&self, status: RelayStatus, seen: Option<i64>) {
        if let Ok(mut current) = self.status.lock() {
            current.status = status;
            if seen.is_some() {
                current.last_seen = seen;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeysSigner;
    use crate::relay::memory::{MemoryNetwork, MemoryRelayConfig};
    use nostr::{Keys, Kind};

    const WAIT: Duration = Duration::from_secs(5);

    fn url(s: &str) -> RelayUrl {
        RelayUrl::parse(s).unwrap()
    }

    fn connection(network: &MemoryNetwork, relay: &str) -> RelayConnection {
        let relay = url(relay);
        let transport = network.connect(&relay).unwrap();
        RelayConnection::new(relay, transport)
    }

    fn text_event(keys: &Keys) -> Event {
        EventBuilder::new(Kind::Custom(32627), "hello")
            .sign_with_keys(keys)
            .unwrap()
    }

    #[tokio::test]
    async fn opens_lazily_on_first_fetch() {
        let network = MemoryNetwork::new();
        network.add_relay("wss://a.example.com", MemoryRelayConfig::default());
        let conn = connection(&network, "wss://a.example.com");

        assert_eq!(network.open_connections(), 0);
        conn.fetch(&[Filter::new()], WAIT, None).await.unwrap();
        assert_eq!(network.open_connections(), 1);
        assert_eq!(conn.status().status, RelayStatus::Connected);
        assert!(conn.status().last_seen.is_some());
    }

    #[tokio::test]
    async fn send_then_fetch_returns_event() {
        let network = MemoryNetwork::new();
        network.add_relay("wss://a.example.com", MemoryRelayConfig::default());
        let conn = connection(&network, "wss://a.example.com");
        let keys = Keys::generate();
        let event = text_event(&keys);

        conn.send(&event, None).await.unwrap();
        let events = conn
            .fetch(&[Filter::new().author(keys.public_key())], WAIT, None)
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, event.id);
    }

    #[tokio::test]
    async fn answers_auth_challenge_with_signer() {
        let network = MemoryNetwork::new();
        network.add_relay(
            "wss://vault.example.com",
            MemoryRelayConfig::default().with_auth("challenge-1"),
        );
        let conn = connection(&network, "wss://vault.example.com");
        let signer = KeysSigner::new(Keys::generate());

        let result = conn.fetch(&[Filter::new()], WAIT, Some(&signer)).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn auth_without_signer_fails() {
        let network = MemoryNetwork::new();
        network.add_relay(
            "wss://vault.example.com",
            MemoryRelayConfig::default().with_auth("challenge-1"),
        );
        let conn = connection(&network, "wss://vault.example.com");

        let result = conn.fetch(&[Filter::new()], WAIT, None).await;

        assert!(matches!(result, Err(RelayError::AuthFailed { .. })));
    }

    #[tokio::test]
    async fn unreachable_relay_marks_failed() {
        let network = MemoryNetwork::new();
        network.add_relay("wss://down.example.com", MemoryRelayConfig::default().down());
        let conn = connection(&network, "wss://down.example.com");

        let result = conn.fetch(&[Filter::new()], WAIT, None).await;

        assert!(matches!(result, Err(RelayError::Connection { .. })));
        assert!(matches!(conn.status().status, RelayStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn close_releases_transport() {
        let network = MemoryNetwork::new();
        network.add_relay("wss://a.example.com", MemoryRelayConfig::default());
        let conn = connection(&network, "wss://a.example.com");

        conn.fetch(&[Filter::new()], WAIT, None).await.unwrap();
        conn.close().await;

        assert_eq!(network.open_connections(), 0);
        assert_eq!(conn.status().status, RelayStatus::Disconnected);
    }
}
