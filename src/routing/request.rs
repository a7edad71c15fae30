//! Read routing.
//!
//! A read normally goes to the public relays only. It also goes to the
//! private relays when it asks for the user's own data in sensitive
//! kinds, so that encrypted-at-rest records kept on a private relay are
//! found without ever asking a private relay about anyone else.

use std::sync::Arc;

use nostr::{Filter, PublicKey, RelayUrl};

use super::{RoutingContext, RoutingSnapshot};
use crate::event::kinds::is_sensitive_kind;

/// Returns true if `filter` asks only for `user`'s own sensitive data.
///
/// That means exactly one author, equal to `user`, and at least one kind,
/// every one of them sensitive. A filter without kinds is not sensitive.
#[must_use]
pub fn is_owned_sensitive(filter: &Filter, user: &PublicKey) -> bool {
    let single_author = filter
        .authors
        .as_ref()
        .is_some_and(|authors| authors.len() == 1 && authors.contains(user));
    let sensitive_kinds = filter
        .kinds
        .as_ref()
        .is_some_and(|kinds| !kinds.is_empty() && kinds.iter().all(|k| is_sensitive_kind(*k)));
    single_author && sensitive_kinds
}

/// Picks the relays a read should go to.
pub struct RequestRouter {
    context: Arc<RoutingContext>,
}

impl RequestRouter {
    /// Creates a router over live routing inputs.
    #[must_use]
    pub const fn new(context: Arc<RoutingContext>) -> Self {
        Self { context }
    }

    /// Routes `filters` using the inputs as of now.
    #[must_use]
    pub fn route(&self, filters: &[Filter]) -> Vec<RelayUrl> {
        Self::route_with(&self.context.snapshot(), filters)
    }

    /// Routes `filters` against a fixed snapshot.
    ///
    /// Private relays come first when included, then public relays, with
    /// the caching relay moved to the front if it is among them. URLs are
    /// unique.
    #[must_use]
    pub fn route_with(snapshot: &RoutingSnapshot, filters: &[Filter]) -> Vec<RelayUrl> {
        let include_private = snapshot
            .user
            .is_some_and(|user| filters.iter().any(|f| is_owned_sensitive(f, &user)));

        let mut urls: Vec<RelayUrl> = Vec::new();
        let groups = if include_private {
            vec![snapshot.private_read_relays(), snapshot.public_read_relays()]
        } else {
            vec![snapshot.public_read_relays()]
        };
        for url in groups.into_iter().flatten() {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }

        if let Some(caching) = &snapshot.caching_relay {
            if let Some(pos) = urls.iter().position(|u| u == caching) {
                let relay = urls.remove(pos);
                urls.insert(0, relay);
            }
        }
        urls
    }
}
