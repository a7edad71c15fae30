//! Relay list and per-category privacy policy.
//!
//! [`PrivacyPolicy`] decides whether a category is encrypted and which
//! relays it may write to; [`RelayDirectory`] owns the relay list itself.
//! Both persist to [`SettingsStorage`] immediately and hand out
//! snapshots, so routing always sees a consistent view.

mod directory;
mod storage;
mod store;

pub use directory::RelayDirectory;
pub use storage::{SettingsStorage, StoredCategoryPolicy, StoredRelay};
pub use store::{CategoryPolicy, PolicySnapshot, PrivacyPolicy};
