//! The user's relay list.
//!
//! Holds the ordered relay collection, the optional caching relay, and
//! the NIP-65 (kind 10002) import/export. Privacy flags come from the
//! [`PrivacyPolicy`]: private relays are listed first for reads and are
//! never written into a published relay list.

use std::sync::{Arc, PoisonError, RwLock};

use nostr::{Event, EventBuilder, Kind, RelayUrl, Timestamp};
use tracing::{debug, info, warn};

use super::storage::{SettingsStorage, StoredRelay};
use super::store::{url_key, PrivacyPolicy};
use crate::event::{relay_list_entries, EventError, TagBuilder};
use crate::relay::Relay;
use crate::store::StoreResult;

const CACHING_RELAY_KEY: &str = "caching_relay";
const RELAY_LIST_AT_KEY: &str = "relay_list_created_at";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    url: RelayUrl,
    read: bool,
    write: bool,
}

#[derive(Debug, Clone, Default)]
struct DirectoryState {
    entries: Vec<Entry>,
    caching_relay: Option<RelayUrl>,
    relay_list_at: Option<Timestamp>,
}

/// Ordered relay collection with NIP-65 sync.
pub struct RelayDirectory {
    storage: Arc<SettingsStorage>,
    policy: Arc<PrivacyPolicy>,
    state: RwLock<Arc<DirectoryState>>,
}

impl RelayDirectory {
    /// Loads the stored relay list, seeding `defaults` when none is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored settings cannot be read or written.
    pub fn load(
        storage: Arc<SettingsStorage>,
        policy: Arc<PrivacyPolicy>,
        defaults: &[RelayUrl],
    ) -> StoreResult<Self> {
        let mut entries: Vec<Entry> = storage
            .load_relays()?
            .into_iter()
            .filter_map(|stored| match RelayUrl::parse(&stored.url) {
                Ok(url) => Some(Entry {
                    url,
                    read: stored.read,
                    write: stored.write,
                }),
                Err(e) => {
                    warn!(url = %stored.url, error = %e, "skipping invalid stored relay");
                    None
                }
            })
            .collect();

        if entries.is_empty() {
            entries = defaults
                .iter()
                .map(|url| Entry {
                    url: url.clone(),
                    read: true,
                    write: true,
                })
                .collect();
            storage.save_relays(&to_stored(&entries))?;
            debug!(count = entries.len(), "seeded default relays");
        }

        let caching_relay = storage
            .get_setting(CACHING_RELAY_KEY)?
            .and_then(|raw| RelayUrl::parse(&raw).ok());
        let relay_list_at = storage
            .get_setting(RELAY_LIST_AT_KEY)?
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(Timestamp::from);

        Ok(Self {
            storage,
            policy,
            state: RwLock::new(Arc::new(DirectoryState {
                entries,
                caching_relay,
                relay_list_at,
            })),
        })
    }

    fn state(&self) -> Arc<DirectoryState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn replace(&self, next: DirectoryState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    /// The relay list with privacy flags applied, private relays first.
    ///
    /// Order within each group is the stored order.
    #[must_use]
    pub fn relays(&self) -> Vec<Relay> {
        let policy = self.policy.snapshot();
        let mut relays: Vec<Relay> = self
            .state()
            .entries
            .iter()
            .map(|entry| Relay {
                url: entry.url.clone(),
                read: entry.read,
                write: entry.write,
                is_private: policy.is_private_relay(&entry.url),
            })
            .collect();
        relays.sort_by_key(|relay| !relay.is_private);
        relays
    }

    /// Adds a relay or updates its flags in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    pub fn add_relay(&self, url: RelayUrl, read: bool, write: bool) -> StoreResult<()> {
        let mut next = DirectoryState::clone(&self.state());
        match next.entries.iter_mut().find(|e| e.url == url) {
            Some(entry) => {
                entry.read = read;
                entry.write = write;
            }
            None => next.entries.push(Entry {
                url: url.clone(),
                read,
                write,
            }),
        }
        self.storage.save_relays(&to_stored(&next.entries))?;
        self.replace(next);
        info!(relay = %url, read, write, "relay added");
        Ok(())
    }

    /// Removes a relay. Returns false if it was not listed.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    pub fn remove_relay(&self, url: &RelayUrl) -> StoreResult<bool> {
        let mut next = DirectoryState::clone(&self.state());
        let before = next.entries.len();
        next.entries.retain(|e| &e.url != url);
        if next.entries.len() == before {
            return Ok(false);
        }
        if next.caching_relay.as_ref() == Some(url) {
            next.caching_relay = None;
            self.storage.set_setting(CACHING_RELAY_KEY, None)?;
        }
        self.storage.save_relays(&to_stored(&next.entries))?;
        self.replace(next);
        info!(relay = %url, "relay removed");
        Ok(true)
    }

    /// The nominated caching relay, if any.
    #[must_use]
    pub fn caching_relay(&self) -> Option<RelayUrl> {
        self.state().caching_relay.clone()
    }

    /// Nominates (or clears) the caching relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    pub fn set_caching_relay(&self, url: Option<RelayUrl>) -> StoreResult<()> {
        self.storage
            .set_setting(CACHING_RELAY_KEY, url.as_ref().map(RelayUrl::as_str))?;
        let mut next = DirectoryState::clone(&self.state());
        next.caching_relay = url;
        self.replace(next);
        Ok(())
    }

    /// Applies a NIP-65 relay list event.
    ///
    /// Non-private entries are replaced by the event's `r` tags; private
    /// relays are kept as they are. Events older than the last one applied
    /// are ignored. Returns true if the list changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the new list cannot be persisted.
    pub fn apply_relay_list_event(&self, event: &Event) -> StoreResult<bool> {
        if event.kind != Kind::RelayList {
            return Ok(false);
        }
        let current = self.state();
        if current.relay_list_at.is_some_and(|at| event.created_at <= at) {
            debug!(event_id = %event.id, "ignoring stale relay list");
            return Ok(false);
        }

        let policy = self.policy.snapshot();
        let mut entries: Vec<Entry> = current
            .entries
            .iter()
            .filter(|e| policy.is_private_relay(&e.url))
            .cloned()
            .collect();

        for listed in relay_list_entries(&event.tags) {
            let Ok(url) = RelayUrl::parse(&listed.url) else {
                debug!(url = %listed.url, "skipping unparseable relay list entry");
                continue;
            };
            if !entries.iter().any(|e| e.url == url) {
                entries.push(Entry {
                    url,
                    read: listed.read,
                    write: listed.write,
                });
            }
        }

        let changed = entries != current.entries;
        self.storage.save_relays(&to_stored(&entries))?;
        self.storage
            .set_setting(RELAY_LIST_AT_KEY, Some(event.created_at.as_secs().to_string().as_str()))?;

        let mut next = DirectoryState::clone(&current);
        next.entries = entries;
        next.relay_list_at = Some(event.created_at);
        self.replace(next);

        info!(event_id = %event.id, relays = self.state().entries.len(), changed, "relay list applied");
        Ok(changed)
    }

    /// Builds the NIP-65 relay list event for the public relays.
    ///
    /// # Errors
    ///
    /// Returns an error if a tag cannot be built.
    pub fn relay_list_builder(&self) -> Result<EventBuilder, EventError> {
        let raw: Vec<Vec<String>> = self
            .relays()
            .into_iter()
            .filter(|relay| !relay.is_private)
            .map(|relay| TagBuilder::r_tag(&url_key(&relay.url), relay.read, relay.write))
            .collect();
        Ok(EventBuilder::new(Kind::RelayList, "").tags(TagBuilder::into_tags(raw)?))
    }
}

fn to_stored(entries: &[Entry]) -> Vec<StoredRelay> {
    entries
        .iter()
        .map(|e| StoredRelay {
            url: url_key(&e.url),
            read: e.read,
            write: e.write,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::Keys;

    fn url(s: &str) -> RelayUrl {
        RelayUrl::parse(s).unwrap()
    }

    fn directory(defaults: &[&str]) -> (RelayDirectory, Arc<PrivacyPolicy>) {
        let storage = Arc::new(SettingsStorage::in_memory().unwrap());
        let policy = Arc::new(PrivacyPolicy::load(Arc::clone(&storage)).unwrap());
        let defaults: Vec<RelayUrl> = defaults.iter().map(|s| url(s)).collect();
        let dir = RelayDirectory::load(storage, Arc::clone(&policy), &defaults).unwrap();
        (dir, policy)
    }

    fn relay_list(keys: &Keys, at: u64, tags: Vec<Vec<String>>) -> Event {
        EventBuilder::new(Kind::RelayList, "")
            .tags(TagBuilder::into_tags(tags).unwrap())
            .custom_created_at(Timestamp::from(at))
            .sign_with_keys(keys)
            .unwrap()
    }

    #[test]
    fn seeds_defaults_when_empty() {
        let (dir, _) = directory(&["wss://a.example.com", "wss://b.example.com"]);
        let relays = dir.relays();
        assert_eq!(relays.len(), 2);
        assert!(relays.iter().all(|r| r.read && r.write && !r.is_private));
    }

    #[test]
    fn private_relays_sort_first() {
        let (dir, policy) = directory(&["wss://a.example.com"]);
        dir.add_relay(url("wss://vault.example.com"), true, true).unwrap();
        policy
            .set_private_relay(&url("wss://vault.example.com"), true)
            .unwrap();

        let relays = dir.relays();
        assert_eq!(relays[0].url, url("wss://vault.example.com"));
        assert!(relays[0].is_private);
    }

    #[test]
    fn relay_list_replaces_public_and_keeps_private() {
        let (dir, policy) = directory(&["wss://a.example.com"]);
        dir.add_relay(url("wss://vault.example.com"), true, true).unwrap();
        policy
            .set_private_relay(&url("wss://vault.example.com"), true)
            .unwrap();
        let keys = Keys::generate();

        let changed = dir
            .apply_relay_list_event(&relay_list(
                &keys,
                100,
                vec![
                    TagBuilder::r_tag("wss://b.example.com", true, true),
                    TagBuilder::r_tag("wss://c.example.com", false, true),
                ],
            ))
            .unwrap();

        assert!(changed);
        let urls: Vec<String> = dir.relays().iter().map(|r| url_key(&r.url)).collect();
        assert_eq!(
            urls,
            vec!["wss://vault.example.com", "wss://b.example.com", "wss://c.example.com"]
        );
        let c = dir.relays().into_iter().find(|r| r.url == url("wss://c.example.com")).unwrap();
        assert!(!c.read);
        assert!(c.write);
    }

    #[test]
    fn stale_relay_list_is_ignored() {
        let (dir, _) = directory(&["wss://a.example.com"]);
        let keys = Keys::generate();
        dir.apply_relay_list_event(&relay_list(
            &keys,
            200,
            vec![TagBuilder::r_tag("wss://b.example.com", true, true)],
        ))
        .unwrap();

        let changed = dir
            .apply_relay_list_event(&relay_list(
                &keys,
                100,
                vec![TagBuilder::r_tag("wss://old.example.com", true, true)],
            ))
            .unwrap();

        assert!(!changed);
        assert_eq!(dir.relays()[0].url, url("wss://b.example.com"));
    }

    #[test]
    fn other_kinds_are_not_relay_lists() {
        let (dir, _) = directory(&["wss://a.example.com"]);
        let event = EventBuilder::new(Kind::TextNote, "hi")
            .sign_with_keys(&Keys::generate())
            .unwrap();
        assert!(!dir.apply_relay_list_event(&event).unwrap());
    }

    #[test]
    fn published_relay_list_excludes_private() {
        let (dir, policy) = directory(&["wss://a.example.com"]);
        dir.add_relay(url("wss://vault.example.com"), true, true).unwrap();
        policy
            .set_private_relay(&url("wss://vault.example.com"), true)
            .unwrap();
        let keys = Keys::generate();

        let event = dir
            .relay_list_builder()
            .unwrap()
            .sign_with_keys(&keys)
            .unwrap();

        assert_eq!(event.kind, Kind::RelayList);
        let tags: Vec<Vec<String>> = event.tags.iter().map(|t| t.as_slice().to_vec()).collect();
        assert_eq!(tags, vec![vec!["r".to_string(), "wss://a.example.com".to_string()]]);
    }

    #[test]
    fn removing_caching_relay_clears_nomination() {
        let (dir, _) = directory(&["wss://a.example.com", "wss://cache.example.com"]);
        dir.set_caching_relay(Some(url("wss://cache.example.com"))).unwrap();
        assert_eq!(dir.caching_relay(), Some(url("wss://cache.example.com")));

        assert!(dir.remove_relay(&url("wss://cache.example.com")).unwrap());
        assert_eq!(dir.caching_relay(), None);
        assert!(!dir.remove_relay(&url("wss://cache.example.com")).unwrap());
    }
}
