//! Relay selection for reads and writes.
//!
//! Both routers work from a [`RoutingSnapshot`] taken at dispatch time,
//! so a relay list or policy change made while a request is queued is
//! picked up by that request, and a request never sees half a change.

mod event;
mod request;

use std::sync::{Arc, PoisonError, RwLock};

use nostr::{PublicKey, RelayUrl};

pub use event::EventRouter;
pub use request::{is_owned_sensitive, RequestRouter};

use crate::policy::{PolicySnapshot, PrivacyPolicy, RelayDirectory};
use crate::relay::Relay;

/// Live routing inputs: relay list, policy, and the logged-in user.
pub struct RoutingContext {
    directory: Arc<RelayDirectory>,
    policy: Arc<PrivacyPolicy>,
    user: RwLock<Option<PublicKey>>,
}

impl RoutingContext {
    /// Creates a context with no logged-in user.
    #[must_use]
    pub const fn new(directory: Arc<RelayDirectory>, policy: Arc<PrivacyPolicy>) -> Self {
        Self {
            directory,
            policy,
            user: RwLock::new(None),
        }
    }

    /// Sets or clears the logged-in user.
    pub fn set_user(&self, user: Option<PublicKey>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }

    /// The logged-in user, if any.
    #[must_use]
    pub fn user(&self) -> Option<PublicKey> {
        *self.user.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Captures the current routing inputs.
    #[must_use]
    pub fn snapshot(&self) -> RoutingSnapshot {
        RoutingSnapshot {
            relays: self.directory.relays(),
            caching_relay: self.directory.caching_relay(),
            user: self.user(),
            policy: self.policy.snapshot(),
        }
    }
}

/// Routing inputs frozen at one instant.
#[derive(Debug, Clone)]
pub struct RoutingSnapshot {
    /// Relay list, private relays first.
    pub relays: Vec<Relay>,
    /// Nominated caching relay.
    pub caching_relay: Option<RelayUrl>,
    /// Logged-in user.
    pub user: Option<PublicKey>,
    /// Privacy policy.
    pub policy: Arc<PolicySnapshot>,
}

impl RoutingSnapshot {
    /// Read-enabled private relays.
    #[must_use]
    pub fn private_read_relays(&self) -> Vec<RelayUrl> {
        self.read_relays(true)
    }

    /// Read-enabled public relays.
    #[must_use]
    pub fn public_read_relays(&self) -> Vec<RelayUrl> {
        self.read_relays(false)
    }

    fn read_relays(&self, private: bool) -> Vec<RelayUrl> {
        self.relays
            .iter()
            .filter(|r| r.read && r.is_private == private)
            .map(|r| r.url.clone())
            .collect()
    }
}
