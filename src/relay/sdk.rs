//! Production transport built on `nostr-sdk`.
//!
//! Each relay gets its own `nostr-sdk` [`Client`] holding exactly that one
//! relay, so a slow or misbehaving relay can never hold up another. When
//! Tor is enabled all traffic goes through the embedded Tor client, with
//! no fallback to direct connections.
//!
//! # Security Model
//!
//! - **WSS Only**: plaintext `ws://` is rejected except for loopback
//!   relays used during development
//! - **No signer in the client**: AUTH challenges are surfaced to the
//!   pool, which asks the user's signer

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use nostr::{ClientMessage, Event, Filter, RelayMessage, RelayUrl};
use nostr_sdk::client::options::{ClientOptions, Connection, ConnectionTarget};
use nostr_sdk::{Client, RelayPoolNotification};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::connection::{RelayConnector, RelayTransport};
use super::error::{RelayError, RelayResult};

/// Prefix relays use in `CLOSED`/`OK` messages when auth is needed.
const AUTH_REQUIRED_PREFIX: &str = "auth-required";

/// Creates `nostr-sdk` transports, optionally routed through Tor.
#[derive(Debug, Clone, Default)]
pub struct SdkConnector {
    tor_dir: Option<PathBuf>,
}

impl SdkConnector {
    /// Direct connections.
    #[must_use]
    pub const fn new() -> Self {
        Self { tor_dir: None }
    }

    /// Routes every connection through embedded Tor, keeping Tor state
    /// under `data_dir`.
    #[must_use]
    pub fn with_tor(data_dir: &Path) -> Self {
        Self {
            tor_dir: Some(data_dir.to_path_buf()),
        }
    }

    fn client(&self) -> Client {
        let opts = match &self.tor_dir {
            Some(dir) => {
                let connection = Connection::new()
                    .embedded_tor_with_path(dir)
                    .target(ConnectionTarget::All);
                ClientOptions::new().connection(connection)
            }
            None => ClientOptions::new(),
        };
        Client::builder().opts(opts).build()
    }
}

impl RelayConnector for SdkConnector {
    fn connect(&self, url: &RelayUrl) -> RelayResult<Arc<dyn RelayTransport>> {
        validate_relay_url(url)?;
        Ok(Arc::new(SdkTransport {
            url: url.clone(),
            client: self.client(),
            challenge: Arc::new(Mutex::new(None)),
            listener: Mutex::new(None),
        }))
    }
}

/// Rejects plaintext `ws://` for anything but loopback hosts.
fn validate_relay_url(url: &RelayUrl) -> RelayResult<()> {
    let raw = url.as_str();
    if let Some(rest) = raw.strip_prefix("ws://") {
        let authority = rest.split(['/', '?']).next().unwrap_or_default();
        let host = if authority.ends_with(']') {
            authority
        } else {
            authority.rsplit_once(':').map_or(authority, |(h, _)| h)
        };
        let loopback = matches!(host, "localhost" | "127.0.0.1" | "[::1]");
        if !loopback {
            return Err(RelayError::InvalidUrl(format!(
                "Plaintext ws:// not allowed for security: {raw}"
            )));
        }
    }
    Ok(())
}

struct SdkTransport {
    url: RelayUrl,
    client: Client,
    challenge: Arc<Mutex<Option<String>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SdkTransport {
    fn take_challenge(&self) -> Option<String> {
        self.challenge
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn spawn_listener(&self) {
        let mut notifications = self.client.notifications();
        let challenge = Arc::clone(&self.challenge);
        let url = self.url.clone();

        let handle = tokio::spawn(async move {
            while let Ok(notification) = notifications.recv().await {
                if let RelayPoolNotification::Message {
                    message: RelayMessage::Auth { challenge: c },
                    ..
                } = notification
                {
                    trace!(relay = %url, "auth challenge received");
                    *challenge.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(c.to_string());
                }
            }
        });

        if let Some(old) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle)
        {
            old.abort();
        }
    }
}

#[async_trait]
impl RelayTransport for SdkTransport {
    async fn open(&self) -> RelayResult<()> {
        self.client
            .add_relay(self.url.as_str())
            .await
            .map_err(|e| RelayError::Connection {
                url: self.url.to_string(),
                reason: e.to_string(),
            })?;
        self.spawn_listener();
        self.client.connect().await;
        debug!(relay = %self.url, "sdk client connecting");
        Ok(())
    }

    async fn fetch(&self, filters: &[Filter], timeout: Duration) -> RelayResult<Vec<Event>> {
        let mut events = Vec::new();
        for filter in filters {
            match self.client.fetch_events(filter.clone(), timeout).await {
                Ok(batch) => events.extend(batch),
                Err(e) => {
                    if let Some(challenge) = self.take_challenge() {
                        return Err(RelayError::AuthRequired { challenge });
                    }
                    return Err(RelayError::Fetch(e.to_string()));
                }
            }
        }

        if events.is_empty() {
            // A relay that wants auth answers CLOSED, which looks like no data
            if let Some(challenge) = self.take_challenge() {
                return Err(RelayError::AuthRequired { challenge });
            }
        }
        Ok(events)
    }

    async fn send(&self, event: &Event) -> RelayResult<()> {
        let output = self
            .client
            .send_event(event)
            .await
            .map_err(|e| RelayError::Publish(e.to_string()))?;

        if !output.success.is_empty() {
            return Ok(());
        }

        match output.failed.into_values().next() {
            Some(reason) if reason.starts_with(AUTH_REQUIRED_PREFIX) => {
                let challenge = self.take_challenge().ok_or_else(|| RelayError::AuthFailed {
                    url: self.url.to_string(),
                    reason: "auth required but no challenge received".to_string(),
                })?;
                Err(RelayError::AuthRequired { challenge })
            }
            Some(reason) => Err(RelayError::Rejected {
                relay: self.url.to_string(),
                reason,
            }),
            None => Err(RelayError::Publish(format!("no answer from {}", self.url))),
        }
    }

    async fn authenticate(&self, auth: &Event) -> RelayResult<()> {
        self.client
            .send_msg_to([self.url.as_str()], ClientMessage::auth(auth.clone()))
            .await
            .map_err(|e| RelayError::AuthFailed {
                url: self.url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn close(&self) {
        if let Some(listener) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            listener.abort();
        }
        self.client.disconnect().await;
        debug!(relay = %self.url, "sdk client disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> RelayUrl {
        RelayUrl::parse(s).unwrap()
    }

    #[test]
    fn rejects_plaintext_remote_relay() {
        let result = validate_relay_url(&url("ws://insecure.relay.com"));

        assert!(result.is_err());
        if let Err(RelayError::InvalidUrl(msg)) = result {
            assert!(msg.contains("Plaintext ws://"));
        }
    }

    #[test]
    fn accepts_wss() {
        assert!(validate_relay_url(&url("wss://relay.damus.io")).is_ok());
    }

    #[test]
    fn accepts_plaintext_loopback() {
        assert!(validate_relay_url(&url("ws://localhost:7777")).is_ok());
        assert!(validate_relay_url(&url("ws://127.0.0.1:7777")).is_ok());
    }

    #[test]
    fn connector_refuses_plaintext_remote() {
        let connector = SdkConnector::new();
        assert!(matches!(
            connector.connect(&url("ws://bad.relay.com")),
            Err(RelayError::InvalidUrl(_))
        ));
    }

    #[test]
    fn tor_connector_remembers_directory() {
        let connector = SdkConnector::with_tor(Path::new("/tmp/tor"));
        assert_eq!(connector.tor_dir.as_deref(), Some(Path::new("/tmp/tor")));
    }
}
