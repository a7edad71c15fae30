//! Read-time resolution of addressable records.

use std::cmp::Ordering;
use std::collections::HashMap;

use nostr::{Event, EventId, Kind, PublicKey};

use crate::event::identifier;
use crate::event::kinds::is_addressable;

/// Keeps only the authoritative version of each addressable record.
///
/// For every `(kind, pubkey, d)` the winner is the greatest `created_at`,
/// ties going to the lexicographically larger id. Regular events are kept
/// as they are, deduplicated by id. Output is newest first.
#[must_use]
pub fn resolve_latest<I>(events: I) -> Vec<Event>
where
    I: IntoIterator<Item = Event>,
{
    let mut latest: HashMap<(Kind, PublicKey, String), Event> = HashMap::new();
    let mut regular: HashMap<EventId, Event> = HashMap::new();

    for event in events {
        if is_addressable(event.kind) {
            let key = (
                event.kind,
                event.pubkey,
                identifier(&event.tags).unwrap_or_default(),
            );
            match latest.get(&key) {
                Some(current) if newer(current, &event) != Ordering::Less => {}
                _ => {
                    latest.insert(key, event);
                }
            }
        } else {
            regular.entry(event.id).or_insert(event);
        }
    }

    let mut out: Vec<Event> = latest.into_values().chain(regular.into_values()).collect();
    out.sort_by(|a, b| newer(b, a));
    out
}

/// Orders by `(created_at, id)`.
fn newer(a: &Event, b: &Event) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.to_hex().cmp(&b.id.to_hex()))
}
