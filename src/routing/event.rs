//! Write routing.

use std::sync::Arc;

use nostr::{Event, RelayUrl};

use super::{RoutingContext, RoutingSnapshot};
use crate::event::Category;

/// Picks the relays an event should be published to.
///
/// Writes go to every write-enabled relay, public or private, minus the
/// relays the event's category has switched off.
pub struct EventRouter {
    context: Arc<RoutingContext>,
}

impl EventRouter {
    /// Creates a router over live routing inputs.
    #[must_use]
    pub const fn new(context: Arc<RoutingContext>) -> Self {
        Self { context }
    }

    /// Routes `event`, inferring its category from its kind.
    #[must_use]
    pub fn route(&self, event: &Event) -> Vec<RelayUrl> {
        self.route_category(Category::from_kind(event.kind))
    }

    /// Routes a write belonging to `category`, or to no category.
    #[must_use]
    pub fn route_category(&self, category: Option<Category>) -> Vec<RelayUrl> {
        Self::route_with(&self.context.snapshot(), category)
    }

    /// Routes against a fixed snapshot.
    #[must_use]
    pub fn route_with(snapshot: &RoutingSnapshot, category: Option<Category>) -> Vec<RelayUrl> {
        let mut urls: Vec<RelayUrl> = Vec::new();
        for relay in snapshot.relays.iter().filter(|r| r.write) {
            let enabled =
                category.is_none_or(|c| snapshot.policy.is_relay_enabled(c, &relay.url));
            if enabled && !urls.contains(&relay.url) {
                urls.push(relay.url.clone());
            }
        }
        urls
    }
}
