//! Scripted in-memory relays for tests.
//!
//! A [`MemoryNetwork`] hands out transports to relays registered with
//! [`MemoryNetwork::add_relay`]. Each relay can be taken down, slowed,
//! made to demand NIP-42 authentication, or made to reject writes, and
//! the network counts open connections so tests can check teardown.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use nostr::{Event, EventId, Filter, Kind, RelayUrl};

use super::connection::{RelayConnector, RelayTransport};
use super::error::{RelayError, RelayResult};
use crate::event::referenced_ids;

/// Behaviour of one in-memory relay.
#[derive(Debug, Clone, Default)]
pub struct MemoryRelayConfig {
    down: bool,
    delay: Option<Duration>,
    auth_challenge: Option<String>,
    reject_writes: Option<String>,
}

impl MemoryRelayConfig {
    /// The relay refuses connections.
    #[must_use]
    pub const fn down(mut self) -> Self {
        self.down = true;
        self
    }

    /// The relay waits `delay` before answering a fetch.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The relay demands NIP-42 authentication with `challenge`.
    #[must_use]
    pub fn with_auth(mut self, challenge: impl Into<String>) -> Self {
        self.auth_challenge = Some(challenge.into());
        self
    }

    /// The relay rejects every write with `reason`.
    #[must_use]
    pub fn rejecting(mut self, reason: impl Into<String>) -> Self {
        self.reject_writes = Some(reason.into());
        self
    }
}

struct MemoryRelay {
    config: Mutex<MemoryRelayConfig>,
    events: Mutex<Vec<Event>>,
    fetches: AtomicUsize,
}

impl MemoryRelay {
    fn new(config: MemoryRelayConfig) -> Self {
        Self {
            config: Mutex::new(config),
            events: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    fn config(&self) -> MemoryRelayConfig {
        lock(&self.config).clone()
    }

    fn store(&self, event: &Event) {
        let mut events = lock(&self.events);
        if events.iter().any(|e| e.id == event.id) {
            return;
        }
        if event.kind == Kind::EventDeletion {
            let doomed: HashSet<EventId> = referenced_ids(&event.tags).into_iter().collect();
            events.retain(|e| e.pubkey != event.pubkey || !doomed.contains(&e.id));
        }
        events.push(event.clone());
    }

    fn matching(&self, filters: &[Filter]) -> Vec<Event> {
        let events = lock(&self.events);
        let mut out: Vec<Event> = Vec::new();
        for filter in filters {
            let mut hits: Vec<&Event> = events.iter().filter(|e| matches(filter, e)).collect();
            hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            if let Some(limit) = filter.limit {
                hits.truncate(limit);
            }
            for hit in hits {
                if !out.iter().any(|e| e.id == hit.id) {
                    out.push(hit.clone());
                }
            }
        }
        out
    }
}

#[derive(Default)]
struct NetworkInner {
    relays: Mutex<HashMap<String, Arc<MemoryRelay>>>,
    open: AtomicUsize,
    opened_total: AtomicUsize,
}

/// A set of in-memory relays addressed by URL.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a relay at `url`, replacing any previous one.
    pub fn add_relay(&self, url: &str, config: MemoryRelayConfig) {
        lock(&self.inner.relays).insert(normalize(url), Arc::new(MemoryRelay::new(config)));
    }

    /// Takes a relay down or brings it back.
    pub fn set_down(&self, url: &str, down: bool) {
        if let Some(relay) = self.relay(url) {
            lock(&relay.config).down = down;
        }
    }

    /// Stores events directly on a relay, bypassing the protocol.
    pub fn seed(&self, url: &str, events: &[Event]) {
        if let Some(relay) = self.relay(url) {
            for event in events {
                relay.store(event);
            }
        }
    }

    /// Events currently held by a relay.
    #[must_use]
    pub fn events(&self, url: &str) -> Vec<Event> {
        self.relay(url)
            .map(|relay| lock(&relay.events).clone())
            .unwrap_or_default()
    }

    /// Number of fetches a relay has answered or refused.
    #[must_use]
    pub fn fetch_count(&self, url: &str) -> usize {
        self.relay(url)
            .map_or(0, |relay| relay.fetches.load(Ordering::SeqCst))
    }

    /// Connections currently open across the network.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Connections ever opened across the network.
    #[must_use]
    pub fn total_opened(&self) -> usize {
        self.inner.opened_total.load(Ordering::SeqCst)
    }

    fn relay(&self, url: &str) -> Option<Arc<MemoryRelay>> {
        lock(&self.inner.relays).get(&normalize(url)).cloned()
    }
}

impl RelayConnector for MemoryNetwork {
    fn connect(&self, url: &RelayUrl) -> RelayResult<Arc<dyn RelayTransport>> {
        let relay = self.relay(url.as_str()).ok_or_else(|| RelayError::Connection {
            url: url.to_string(),
            reason: "unknown relay".to_string(),
        })?;

        Ok(Arc::new(MemoryTransport {
            url: url.to_string(),
            relay,
            network: Arc::clone(&self.inner),
            open: Mutex::new(false),
            authenticated: Mutex::new(false),
        }))
    }
}

struct MemoryTransport {
    url: String,
    relay: Arc<MemoryRelay>,
    network: Arc<NetworkInner>,
    open: Mutex<bool>,
    authenticated: Mutex<bool>,
}

impl MemoryTransport {
    fn check(&self, config: &MemoryRelayConfig) -> RelayResult<()> {
        if config.down || !*lock(&self.open) {
            return Err(RelayError::Connection {
                url: self.url.clone(),
                reason: "connection closed".to_string(),
            });
        }
        match &config.auth_challenge {
            Some(challenge) if !*lock(&self.authenticated) => Err(RelayError::AuthRequired {
                challenge: challenge.clone(),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RelayTransport for MemoryTransport {
    async fn open(&self) -> RelayResult<()> {
        if self.relay.config().down {
            return Err(RelayError::Connection {
                url: self.url.clone(),
                reason: "connection refused".to_string(),
            });
        }
        let mut open = lock(&self.open);
        if !*open {
            *open = true;
            self.network.open.fetch_add(1, Ordering::SeqCst);
            self.network.opened_total.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn fetch(&self, filters: &[Filter], _timeout: Duration) -> RelayResult<Vec<Event>> {
        let config = self.relay.config();
        self.relay.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = config.delay {
            tokio::time::sleep(delay).await;
        }
        self.check(&config)?;
        Ok(self.relay.matching(filters))
    }

    async fn send(&self, event: &Event) -> RelayResult<()> {
        let config = self.relay.config();
        self.check(&config)?;
        if let Some(reason) = config.reject_writes {
            return Err(RelayError::Rejected {
                relay: self.url.clone(),
                reason,
            });
        }
        self.relay.store(event);
        Ok(())
    }

    async fn authenticate(&self, auth: &Event) -> RelayResult<()> {
        let config = self.relay.config();
        let Some(challenge) = config.auth_challenge else {
            return Ok(());
        };

        let answered = auth.kind == Kind::Authentication
            && auth.verify().is_ok()
            && auth.tags.iter().any(|tag| {
                let parts = tag.as_slice();
                parts.len() >= 2 && parts[0] == "challenge" && parts[1] == challenge
            });

        if answered {
            *lock(&self.authenticated) = true;
            Ok(())
        } else {
            Err(RelayError::AuthFailed {
                url: self.url.clone(),
                reason: "invalid auth event".to_string(),
            })
        }
    }

    async fn close(&self) {
        let mut open = lock(&self.open);
        if *open {
            *open = false;
            self.network.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// NIP-01 filter matching for the fields the tracker uses.
fn matches(filter: &Filter, event: &Event) -> bool {
    if let Some(ids) = &filter.ids {
        if !ids.contains(&event.id) {
            return false;
        }
    }
    if let Some(authors) = &filter.authors {
        if !authors.contains(&event.pubkey) {
            return false;
        }
    }
    if let Some(kinds) = &filter.kinds {
        if !kinds.contains(&event.kind) {
            return false;
        }
    }
    if filter.since.is_some_and(|since| event.created_at < since) {
        return false;
    }
    if filter.until.is_some_and(|until| event.created_at > until) {
        return false;
    }
    filter.generic_tags.iter().all(|(letter, values)| {
        let name = letter.as_char().to_string();
        event.tags.iter().any(|tag| {
            let parts = tag.as_slice();
            parts.len() >= 2 && parts[0] == name && values.contains(&parts[1])
        })
    })
}

fn normalize(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
