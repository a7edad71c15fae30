//! Reusable test helpers for tracker integration tests.
//!
//! Relays are simulated with the in-memory transport from the
//! `test-utils` feature. Each `MemoryNetwork` is an isolated set of relays;
//! each `Tracker` opened over it is a separate device.

#![allow(dead_code)]

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hearth_core::event::{Category, KeysSigner, TagBuilder};
use hearth_core::relay::memory::{MemoryNetwork, MemoryRelayConfig};
use hearth_core::{Tracker, TrackerConfig};
use nostr::{Event, EventBuilder, Keys, RelayUrl};

pub const RELAY_A: &str = "wss://a.example.com";
pub const RELAY_B: &str = "wss://b.example.com";

/// Atomic counter for unique test directory names.
static HELPER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Creates a unique temporary directory for test isolation.
pub fn unique_temp_dir(prefix: &str) -> PathBuf {
    let id = HELPER_COUNTER.fetch_add(1, Ordering::SeqCst);
    env::temp_dir().join(format!(
        "hearth_test_{}_{}_{}",
        prefix,
        std::process::id(),
        id
    ))
}

/// Removes a temporary test directory. Ignores errors silently.
pub fn cleanup_dir(dir: &PathBuf) {
    let _ = std::fs::remove_dir_all(dir);
}

pub fn url(raw: &str) -> RelayUrl {
    RelayUrl::parse(raw).expect("valid relay url")
}

/// A network with healthy relays at every given URL.
pub fn network(relays: &[&str]) -> MemoryNetwork {
    let network = MemoryNetwork::new();
    for relay in relays {
        network.add_relay(relay, MemoryRelayConfig::default());
    }
    network
}

/// An in-memory tracker whose default relays are `relays`.
pub fn tracker(network: &MemoryNetwork, relays: &[&str]) -> Tracker {
    let config = TrackerConfig::new().with_default_relays(relays.iter().copied());
    Tracker::open_with(config, Arc::new(network.clone())).expect("tracker should open")
}

/// Relay A public, relay B private, vehicles encrypted.
pub fn private_vehicle_tracker(network: &MemoryNetwork) -> Tracker {
    let tracker = tracker(network, &[RELAY_A, RELAY_B]);
    tracker
        .policy()
        .set_private_relay(&url(RELAY_B), true)
        .expect("mark private");
    tracker
        .policy()
        .set_encrypted(Category::Vehicles, true)
        .expect("enable encryption");
    tracker
}

pub fn signer(keys: &Keys) -> Arc<KeysSigner> {
    Arc::new(KeysSigner::new(keys.clone()))
}

/// A signed plaintext vehicle record.
pub fn vehicle_event(keys: &Keys, d: &str, content: &str) -> Event {
    EventBuilder::new(Category::Vehicles.record_kind(), content)
        .tags(TagBuilder::into_tags(vec![TagBuilder::d_tag(d)]).expect("valid tags"))
        .sign_with_keys(keys)
        .expect("should sign vehicle event")
}
