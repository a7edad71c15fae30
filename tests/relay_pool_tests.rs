//! Integration tests for the relay pool over the in-memory transport.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use hearth_core::relay::memory::MemoryRelayConfig;
use hearth_core::relay::{RelayError, RelayPool, Visibility};
use hearth_core::sync::{Invalidation, InvalidationBus};
use nostr::{Filter, Keys};

use helpers::{network, url, vehicle_event, RELAY_A, RELAY_B};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test(start_paused = true)]
async fn query_deduplicates_across_relays() {
    let keys = Keys::generate();
    let net = network(&[RELAY_A, RELAY_B]);
    let shared = vehicle_event(&keys, "car", "{}");
    let only_b = vehicle_event(&keys, "bike", "{}");
    net.seed(RELAY_A, &[shared.clone()]);
    net.seed(RELAY_B, &[shared.clone(), only_b.clone()]);
    let pool = RelayPool::new(Arc::new(net.clone()), InvalidationBus::new());

    let events = pool
        .query(
            &[url(RELAY_A), url(RELAY_B)],
            &[Filter::new().author(keys.public_key())],
            TIMEOUT,
        )
        .await
        .expect("query should succeed");

    assert_eq!(events.len(), 2, "shared event must appear once");
    assert!(events.iter().any(|e| e.id == shared.id));
    assert!(events.iter().any(|e| e.id == only_b.id));
}

#[tokio::test(start_paused = true)]
async fn slow_relay_is_dropped_from_query() {
    let keys = Keys::generate();
    let net = network(&[RELAY_A]);
    net.add_relay(
        RELAY_B,
        MemoryRelayConfig::default().with_delay(Duration::from_secs(60)),
    );
    net.seed(RELAY_A, &[vehicle_event(&keys, "car", "{}")]);
    net.seed(RELAY_B, &[vehicle_event(&keys, "boat", "{}")]);
    let pool = RelayPool::new(Arc::new(net.clone()), InvalidationBus::new());

    let events = pool
        .query(
            &[url(RELAY_A), url(RELAY_B)],
            &[Filter::new().author(keys.public_key())],
            TIMEOUT,
        )
        .await
        .expect("fast relay answered");

    assert_eq!(events.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn all_relays_down_is_no_response() {
    let net = network(&[]);
    net.add_relay(RELAY_A, MemoryRelayConfig::default().down());
    let pool = RelayPool::new(Arc::new(net.clone()), InvalidationBus::new());

    let result = pool
        .query(&[url(RELAY_A)], &[Filter::new().limit(1)], TIMEOUT)
        .await;

    assert!(matches!(result, Err(RelayError::NoResponse)));
}

#[tokio::test(start_paused = true)]
async fn hiding_tears_down_and_showing_invalidates() {
    let net = network(&[RELAY_A, RELAY_B]);
    let bus = InvalidationBus::new();
    let pool = RelayPool::new(Arc::new(net.clone()), bus.clone());
    let mut rx = bus.subscribe();

    pool.query(
        &[url(RELAY_A), url(RELAY_B)],
        &[Filter::new().limit(1)],
        TIMEOUT,
    )
    .await
    .expect("query should succeed");
    assert_eq!(net.open_connections(), 2);

    pool.set_visibility(Visibility::Hidden).await;
    assert_eq!(net.open_connections(), 0);
    assert_eq!(pool.connection_count(), 0);
    assert!(matches!(
        pool.query(&[url(RELAY_A)], &[Filter::new().limit(1)], TIMEOUT)
            .await,
        Err(RelayError::PoolClosed)
    ));

    pool.set_visibility(Visibility::Visible).await;
    assert_eq!(rx.recv().await.expect("signal"), Invalidation::All);

    pool.query(&[url(RELAY_A)], &[Filter::new().limit(1)], TIMEOUT)
        .await
        .expect("fresh connection");
    assert_eq!(net.open_connections(), 1);
    assert_eq!(net.total_opened(), 3);
}

#[tokio::test(start_paused = true)]
async fn publish_reaches_every_target() {
    let keys = Keys::generate();
    let net = network(&[RELAY_A]);
    net.add_relay(RELAY_B, MemoryRelayConfig::default().rejecting("blocked: spam"));
    let pool = RelayPool::new(Arc::new(net.clone()), InvalidationBus::new());
    let event = vehicle_event(&keys, "car", "{}");

    let result = pool
        .publish(&event, &[url(RELAY_A), url(RELAY_B)])
        .await
        .expect("publish should run");

    assert!(result.is_success());
    assert_eq!(result.accepted_by, vec![url(RELAY_A).to_string()]);
    assert_eq!(result.rejected_by.len(), 1);
    assert_eq!(net.events(RELAY_A).len(), 1);
    assert!(net.events(RELAY_B).is_empty());
}
