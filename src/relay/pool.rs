//! Pooled connections to independently-operated relays.
//!
//! The pool owns every [`RelayConnection`]. Queries fan out concurrently
//! to the routed relays and keep whatever answers before the timeout;
//! publishes go to each target independently. A relay that fails, times
//! out, or cannot authenticate is dropped from that one operation and
//! logged. Only "nobody answered at all" is reported to the caller.
//!
//! The pool follows host visibility: hiding tears every connection down,
//! showing again starts from a clean slate and asks cached views to
//! refresh.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::future::join_all;
use nostr::{Event, Filter, RelayUrl};
use tracing::{debug, info, warn};

use super::connection::{RelayConnection, RelayConnector};
use super::error::{RelayError, RelayResult};
use super::types::{PublishResult, RelayConnectionStatus, Visibility};
use crate::event::Signer;
use crate::sync::InvalidationBus;

/// Default per-relay timeout for publishing.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection pool keyed by relay URL.
pub struct RelayPool {
    connector: Arc<dyn RelayConnector>,
    connections: RwLock<HashMap<RelayUrl, Arc<RelayConnection>>>,
    signer: RwLock<Option<Arc<dyn Signer>>>,
    open: AtomicBool,
    invalidations: InvalidationBus,
    publish_timeout: Duration,
}

impl RelayPool {
    /// Creates an open pool with no connections yet.
    #[must_use]
    pub fn new(connector: Arc<dyn RelayConnector>, invalidations: InvalidationBus) -> Self {
        Self {
            connector,
            connections: RwLock::new(HashMap::new()),
            signer: RwLock::new(None),
            open: AtomicBool::new(true),
            invalidations,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    /// Sets the per-relay publish timeout.
    #[must_use]
    pub const fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Replaces the signer used to answer authentication challenges.
    ///
    /// Operations already in flight keep the signer they started with.
    pub fn set_signer(&self, signer: Option<Arc<dyn Signer>>) {
        *self
            .signer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = signer;
    }

    fn current_signer(&self) -> Option<Arc<dyn Signer>> {
        self.signer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns true unless the pool has been closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Reopens a closed pool. Connections are created lazily on use.
    pub fn open(&self) {
        if !self.open.swap(true, Ordering::SeqCst) {
            info!("relay pool opened");
        }
    }

    /// Closes every connection. Later operations fail with
    /// [`RelayError::PoolClosed`] until [`open`](Self::open) is called.
    pub async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);

        let drained: Vec<Arc<RelayConnection>> = {
            let mut connections = self
                .connections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            connections.drain().map(|(_, c)| c).collect()
        };

        let count = drained.len();
        join_all(drained.iter().map(|c| c.close())).await;
        info!(closed = count, "relay pool closed");
    }

    /// Applies a host visibility change.
    ///
    /// Hidden closes the pool. Visible reopens it and emits a global
    /// invalidation so cached queries re-run against fresh connections.
    pub async fn set_visibility(&self, visibility: Visibility) {
        match visibility {
            Visibility::Hidden => self.close().await,
            Visibility::Visible => {
                self.open();
                self.invalidations.invalidate_all();
            }
        }
    }

    /// Fetches events matching `filters` from every relay in `urls`.
    ///
    /// Each relay gets `timeout`; results from relays that answer in time
    /// are merged and deduplicated by event id, first occurrence wins.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::PoolClosed`] if the pool is closed and
    /// [`RelayError::NoResponse`] if no relay answered.
    pub async fn query(
        &self,
        urls: &[RelayUrl],
        filters: &[Filter],
        timeout: Duration,
    ) -> RelayResult<Vec<Event>> {
        if !self.is_open() {
            return Err(RelayError::PoolClosed);
        }
        if filters.is_empty() {
            return Ok(Vec::new());
        }
        if urls.is_empty() {
            return Err(RelayError::NoResponse);
        }

        let signer = self.current_signer();
        let attempts = urls.iter().map(|url| {
            let signer = signer.clone();
            async move {
                let connection = self.connection(url)?;
                tokio::time::timeout(timeout, connection.fetch(filters, timeout, signer.as_deref()))
                    .await
                    .map_err(|_| RelayError::Timeout(format!("fetch from {url}")))?
            }
        });
        let results = join_all(attempts).await;

        let mut responded = 0usize;
        let mut seen = HashSet::new();
        let mut events = Vec::new();
        for (url, result) in urls.iter().zip(results) {
            match result {
                Ok(batch) => {
                    responded += 1;
                    debug!(relay = %url, count = batch.len(), "relay answered");
                    for event in batch {
                        if seen.insert(event.id) {
                            events.push(event);
                        }
                    }
                }
                Err(e) => debug!(relay = %url, error = %e, "relay dropped from query"),
            }
        }

        if responded == 0 {
            warn!(relays = urls.len(), "no relay answered query");
            return Err(RelayError::NoResponse);
        }

        debug!(responded, total = urls.len(), events = events.len(), "query complete");
        Ok(events)
    }

    /// Publishes `event` to every relay in `urls` independently.
    ///
    /// Delivery is best-effort: the result lists which relays accepted,
    /// rejected or never answered. An empty target list publishes nowhere.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::PoolClosed`] if the pool is closed.
    pub async fn publish(&self, event: &Event, urls: &[RelayUrl]) -> RelayResult<PublishResult> {
        if !self.is_open() {
            return Err(RelayError::PoolClosed);
        }

        let mut result = PublishResult::empty(event.id);
        if urls.is_empty() {
            warn!(event_id = %event.id, "no write relays, event not published");
            return Ok(result);
        }

        let signer = self.current_signer();
        let attempts = urls.iter().map(|url| {
            let signer = signer.clone();
            async move {
                let connection = self.connection(url)?;
                tokio::time::timeout(self.publish_timeout, connection.send(event, signer.as_deref()))
                    .await
                    .map_err(|_| RelayError::Timeout(format!("publish to {url}")))?
            }
        });
        let outcomes = join_all(attempts).await;

        for (url, outcome) in urls.iter().zip(outcomes) {
            match outcome {
                Ok(()) => result.accepted_by.push(url.to_string()),
                Err(RelayError::Rejected { reason, .. }) => {
                    warn!(relay = %url, %reason, "relay rejected event");
                    result.rejected_by.push((url.to_string(), reason));
                }
                Err(e) => {
                    debug!(relay = %url, error = %e, "publish failed");
                    result.failed.push(url.to_string());
                }
            }
        }

        info!(
            event_id = %event.id,
            accepted = result.success_count(),
            attempted = result.total_attempted(),
            "event published"
        );
        Ok(result)
    }

    /// Status of every connection the pool currently holds.
    #[must_use]
    pub fn relay_status(&self) -> Vec<RelayConnectionStatus> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|c| c.status())
            .collect()
    }

    /// Number of connections the pool currently holds.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn connection(&self, url: &RelayUrl) -> RelayResult<Arc<RelayConnection>> {
        if let Some(existing) = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
        {
            return Ok(Arc::clone(existing));
        }

        if !self.is_open() {
            return Err(RelayError::PoolClosed);
        }

        let transport = self.connector.connect(url)?;
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let connection = connections
            .entry(url.clone())
            .or_insert_with(|| Arc::new(RelayConnection::new(url.clone(), transport)));
        Ok(Arc::clone(connection))
    }
}
