//! Per-category privacy policy.
//!
//! The policy is read on every routing decision and written rarely, so
//! readers get an immutable [`PolicySnapshot`] and every mutation
//! persists first, then swaps in a whole new snapshot. A change only
//! affects writes made after it; turning encryption off never decrypts
//! anything already published.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use nostr::RelayUrl;
use tracing::info;

use super::storage::{SettingsStorage, StoredCategoryPolicy};
use crate::event::Category;
use crate::store::StoreResult;

/// Policy for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryPolicy {
    /// Whether new records in this category are encrypted.
    pub encryption_enabled: bool,
    /// Per-relay overrides. Relays not listed are enabled.
    pub relay_overrides: BTreeMap<String, bool>,
}

impl From<StoredCategoryPolicy> for CategoryPolicy {
    fn from(stored: StoredCategoryPolicy) -> Self {
        Self {
            encryption_enabled: stored.encrypted,
            relay_overrides: stored.relay_overrides,
        }
    }
}

/// Immutable view of the whole policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySnapshot {
    categories: BTreeMap<Category, CategoryPolicy>,
    private_relays: BTreeSet<String>,
}

impl PolicySnapshot {
    /// Whether `category` encrypts new records. Defaults to false.
    #[must_use]
    pub fn is_encrypted(&self, category: Category) -> bool {
        self.categories
            .get(&category)
            .is_some_and(|p| p.encryption_enabled)
    }

    /// Whether `category` may write to `url`. Defaults to true.
    #[must_use]
    pub fn is_relay_enabled(&self, category: Category, url: &RelayUrl) -> bool {
        self.categories
            .get(&category)
            .and_then(|p| p.relay_overrides.get(&url_key(url)))
            .copied()
            .unwrap_or(true)
    }

    /// Whether `url` is in the private relay set.
    #[must_use]
    pub fn is_private_relay(&self, url: &RelayUrl) -> bool {
        self.private_relays.contains(&url_key(url))
    }

    /// Policy for `category`, defaults if never set.
    #[must_use]
    pub fn category(&self, category: Category) -> CategoryPolicy {
        self.categories.get(&category).cloned().unwrap_or_default()
    }
}

/// Sole writer of category settings.
pub struct PrivacyPolicy {
    storage: Arc<SettingsStorage>,
    snapshot: RwLock<Arc<PolicySnapshot>>,
}

impl PrivacyPolicy {
    /// Loads the stored policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored policy cannot be read.
    pub fn load(storage: Arc<SettingsStorage>) -> StoreResult<Self> {
        let categories = storage
            .load_category_policies()?
            .into_iter()
            .map(|(category, stored)| (category, CategoryPolicy::from(stored)))
            .collect();
        let private_relays = storage.load_private_relays()?;

        Ok(Self {
            storage,
            snapshot: RwLock::new(Arc::new(PolicySnapshot {
                categories,
                private_relays,
            })),
        })
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// See [`PolicySnapshot::is_encrypted`].
    #[must_use]
    pub fn is_encrypted(&self, category: Category) -> bool {
        self.snapshot().is_encrypted(category)
    }

    /// Turns encryption of new records on or off for `category`.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted; the in-memory
    /// policy is unchanged in that case.
    pub fn set_encrypted(&self, category: Category, enabled: bool) -> StoreResult<()> {
        self.storage.set_encrypted(category, enabled)?;
        self.update(|s| {
            s.categories.entry(category).or_default().encryption_enabled = enabled;
        });
        info!(%category, enabled, "category encryption changed");
        Ok(())
    }

    /// See [`PolicySnapshot::is_relay_enabled`].
    #[must_use]
    pub fn is_relay_enabled(&self, category: Category, url: &RelayUrl) -> bool {
        self.snapshot().is_relay_enabled(category, url)
    }

    /// Enables or disables writes of `category` to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    pub fn set_relay_enabled(&self, category: Category, url: &RelayUrl, enabled: bool) -> StoreResult<()> {
        let key = url_key(url);
        self.storage.set_relay_override(category, &key, enabled)?;
        self.update(|s| {
            s.categories
                .entry(category)
                .or_default()
                .relay_overrides
                .insert(key, enabled);
        });
        info!(%category, relay = %url, enabled, "category relay override changed");
        Ok(())
    }

    /// See [`PolicySnapshot::is_private_relay`].
    #[must_use]
    pub fn is_private_relay(&self, url: &RelayUrl) -> bool {
        self.snapshot().is_private_relay(url)
    }

    /// Adds `url` to or removes it from the private relay set.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    pub fn set_private_relay(&self, url: &RelayUrl, private: bool) -> StoreResult<()> {
        let key = url_key(url);
        self.storage.set_private_relay(&key, private)?;
        self.update(|s| {
            if private {
                s.private_relays.insert(key);
            } else {
                s.private_relays.remove(&key);
            }
        });
        info!(relay = %url, private, "private relay flag changed");
        Ok(())
    }

    fn update(&self, mutate: impl FnOnce(&mut PolicySnapshot)) {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = PolicySnapshot::clone(&guard);
        mutate(&mut next);
        *guard = Arc::new(next);
    }
}

/// Storage key for a relay URL.
pub(crate) fn url_key(url: &RelayUrl) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> RelayUrl {
        RelayUrl::parse(s).unwrap()
    }

    fn policy() -> PrivacyPolicy {
        PrivacyPolicy::load(Arc::new(SettingsStorage::in_memory().unwrap())).unwrap()
    }

    #[test]
    fn defaults_are_plaintext_and_enabled() {
        let policy = policy();
        for category in Category::ALL {
            assert!(!policy.is_encrypted(category));
            assert!(policy.is_relay_enabled(category, &url("wss://a.example.com")));
        }
        assert!(!policy.is_private_relay(&url("wss://a.example.com")));
    }

    #[test]
    fn set_encrypted_only_touches_that_category() {
        let policy = policy();
        policy.set_encrypted(Category::Vehicles, true).unwrap();

        assert!(policy.is_encrypted(Category::Vehicles));
        assert!(!policy.is_encrypted(Category::Pets));
    }

    #[test]
    fn relay_override_round_trips() {
        let policy = policy();
        let relay = url("wss://a.example.com");

        policy.set_relay_enabled(Category::Pets, &relay, false).unwrap();
        assert!(!policy.is_relay_enabled(Category::Pets, &relay));
        assert!(policy.is_relay_enabled(Category::Vehicles, &relay));

        policy.set_relay_enabled(Category::Pets, &relay, true).unwrap();
        assert!(policy.is_relay_enabled(Category::Pets, &relay));
    }

    #[test]
    fn old_snapshot_is_unaffected_by_mutation() {
        let policy = policy();
        let before = policy.snapshot();

        policy.set_encrypted(Category::Vehicles, true).unwrap();

        assert!(!before.is_encrypted(Category::Vehicles));
        assert!(policy.snapshot().is_encrypted(Category::Vehicles));
    }

    #[test]
    fn policy_survives_reload() {
        let storage = Arc::new(SettingsStorage::in_memory().unwrap());
        {
            let policy = PrivacyPolicy::load(Arc::clone(&storage)).unwrap();
            policy.set_encrypted(Category::Warranties, true).unwrap();
            policy
                .set_private_relay(&url("wss://vault.example.com"), true)
                .unwrap();
        }

        let reloaded = PrivacyPolicy::load(storage).unwrap();
        assert!(reloaded.is_encrypted(Category::Warranties));
        assert!(reloaded.is_private_relay(&url("wss://vault.example.com")));
    }
}
