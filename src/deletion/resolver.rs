//! Sibling discovery across the private and public relay groups.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use nostr::{EventId, Filter, Kind, PublicKey, RelayUrl};
use tracing::debug;

use super::SiblingScope;
use crate::cache::EventCache;
use crate::relay::RelayPool;
use crate::routing::RoutingContext;

/// Finds every event id belonging to one logical record.
pub struct DeletionResolver {
    pool: Arc<RelayPool>,
    context: Arc<RoutingContext>,
    cache: Arc<EventCache>,
    timeout: Duration,
}

impl DeletionResolver {
    /// Creates a resolver that gives each relay group `timeout`.
    #[must_use]
    pub const fn new(
        pool: Arc<RelayPool>,
        context: Arc<RoutingContext>,
        cache: Arc<EventCache>,
        timeout: Duration,
    ) -> Self {
        Self {
            pool,
            context,
            cache,
            timeout,
        }
    }

    /// Returns the union of sibling ids held by the private relays, the
    /// public relays, and the local cache.
    ///
    /// The two relay groups are queried independently and concurrently so
    /// that a slow or failing group cannot hide the other's copies. Relay
    /// and cache failures shrink the result, they never fail it.
    pub async fn find_sibling_ids(
        &self,
        kind: Kind,
        pubkey: &PublicKey,
        scope: &SiblingScope,
    ) -> Vec<EventId> {
        let filter = match scope {
            SiblingScope::Identifier(d) => Filter::new().author(*pubkey).kind(kind).identifier(d.clone()),
            SiblingScope::CreatedAt(at) => Filter::new()
                .author(*pubkey)
                .kind(kind)
                .since(*at)
                .until(*at),
        };
        let filters = [filter];

        let snapshot = self.context.snapshot();
        let private = snapshot.private_read_relays();
        let public = snapshot.public_read_relays();
        let (from_private, from_public) = tokio::join!(
            self.query_group("private", &private, &filters),
            self.query_group("public", &public, &filters),
        );

        let cached = match scope {
            SiblingScope::Identifier(d) => self.cache.ids_for_identifier(kind, pubkey, d),
            SiblingScope::CreatedAt(at) => self.cache.ids_created_at(kind, pubkey, *at),
        }
        .unwrap_or_else(|e| {
            debug!(error = %e, "cache sibling lookup failed");
            Vec::new()
        });

        let ids: BTreeSet<EventId> = from_private
            .into_iter()
            .chain(from_public)
            .chain(cached)
            .collect();
        debug!(%kind, siblings = ids.len(), "siblings resolved");
        ids.into_iter().collect()
    }

    async fn query_group(&self, group: &str, urls: &[RelayUrl], filters: &[Filter]) -> Vec<EventId> {
        if urls.is_empty() {
            return Vec::new();
        }
        match self.pool.query(urls, filters, self.timeout).await {
            Ok(events) => events.into_iter().map(|e| e.id).collect(),
            Err(e) => {
                debug!(group, error = %e, "sibling query failed");
                Vec::new()
            }
        }
    }
}
