//! Login-time cache and network reconciliation.
//!
//! A sync run walks [`SyncPhase`] in order:
//!
//! 1. read every tracked kind for the user from the cache (always
//!    completes, a broken cache reads as empty)
//! 2. wait for the relay list, bounded by `relay_list_wait`
//! 3. one batched network fetch with an adaptive timeout
//! 4. write the batch to the cache once, then invalidate everything
//!
//! If the network fails the run falls back to whatever the cache held.
//! Sessions are numbered; a run that finds its session ended when the
//! network answers drops the results instead of writing them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use nostr::{Event, EventId, Filter, Kind, PublicKey, Timestamp};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::invalidation::InvalidationBus;
use super::state::{SyncPhase, SyncReport, SyncState, SyncTimeouts};
use crate::cache::EventCache;
use crate::event::kinds::tracked_kinds;
use crate::event::{referenced_coordinates, referenced_ids, SignerKind};
use crate::relay::RelayPool;
use crate::routing::RequestRouter;

/// Drives login sync and owns per-session sync state.
pub struct SyncOrchestrator {
    cache: Arc<EventCache>,
    pool: Arc<RelayPool>,
    router: RequestRouter,
    invalidations: InvalidationBus,
    timeouts: SyncTimeouts,
    generation: AtomicU64,
    state: RwLock<Option<SyncState>>,
    phase: watch::Sender<SyncPhase>,
    relay_list: watch::Sender<Option<PublicKey>>,
}

impl SyncOrchestrator {
    /// Creates an idle orchestrator.
    #[must_use]
    pub fn new(
        cache: Arc<EventCache>,
        pool: Arc<RelayPool>,
        router: RequestRouter,
        invalidations: InvalidationBus,
        timeouts: SyncTimeouts,
    ) -> Self {
        Self {
            cache,
            pool,
            router,
            invalidations,
            timeouts,
            generation: AtomicU64::new(0),
            state: RwLock::new(None),
            phase: watch::Sender::new(SyncPhase::Idle),
            relay_list: watch::Sender::new(None),
        }
    }

    /// Starts a session for `pubkey`, ending any previous one.
    ///
    /// Returns the session number to pass to [`run`](Self::run).
    pub fn begin_session(&self, pubkey: PublicKey) -> u64 {
        let session = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(SyncState::new(pubkey));
        self.relay_list.send_replace(None);
        self.phase.send_replace(SyncPhase::Idle);
        debug!(%pubkey, session, "sync session started");
        session
    }

    /// Ends the current session. An in-flight run discards its results.
    pub fn end_session(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.relay_list.send_replace(None);
        self.phase.send_replace(SyncPhase::Idle);
        debug!("sync session ended");
    }

    /// Returns true while `session` is the current session.
    #[must_use]
    pub fn is_current(&self, session: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == session
    }

    /// The current session number.
    #[must_use]
    pub fn session(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    /// Watches phase changes.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    /// Current session state, if logged in.
    #[must_use]
    pub fn state(&self) -> Option<SyncState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Opens the relay list gate for `pubkey` if it is the session user.
    pub fn mark_relay_list_loaded(&self, pubkey: &PublicKey) {
        let matched = {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            match guard.as_mut() {
                Some(state) if state.pubkey == *pubkey => {
                    state.relay_list_loaded = true;
                    true
                }
                _ => false,
            }
        };
        if matched {
            self.relay_list.send_replace(Some(*pubkey));
            debug!(%pubkey, "relay list gate opened");
        } else {
            debug!(%pubkey, "relay list loaded for a stale session");
        }
    }

    /// Whether the relay list has been loaded for `pubkey` this session.
    #[must_use]
    pub fn relay_list_synced_for(&self, pubkey: &PublicKey) -> bool {
        *self.relay_list.borrow() == Some(*pubkey)
    }

    /// Runs a full sync for `pubkey` within `session`.
    pub async fn run(&self, session: u64, pubkey: PublicKey, signer: SignerKind) -> SyncReport {
        let kinds = tracked_kinds();

        self.set_phase(session, SyncPhase::CacheChecking);
        let cached_events = match self.cache.get_by_kind_author(&kinds, &pubkey) {
            Ok(events) => events.len(),
            Err(e) => {
                warn!(error = %e, "cache read failed, treating as empty");
                0
            }
        };
        debug!(%pubkey, cached_events, "cache checked");

        self.set_phase(session, SyncPhase::GatedOnRelayList);
        self.wait_for_relay_list(&pubkey).await;

        let timeout = self
            .timeouts
            .network_timeout(cached_events > 0, signer.is_remote());
        let mut report = SyncReport {
            cached_events,
            has_any_data: cached_events > 0,
            timeout_used: timeout,
            ..SyncReport::default()
        };

        if !self.is_current(session) {
            report.discarded = true;
            return report;
        }
        self.set_phase(session, SyncPhase::NetworkSyncing);

        let filters = vec![
            Filter::new().author(pubkey).kinds(kinds),
            Filter::new().author(pubkey).kind(Kind::EventDeletion),
        ];
        let urls = self.router.route(&filters);
        // The pool already bounds each relay by `timeout`
        let result = self.pool.query(&urls, &filters, timeout).await;

        if !self.is_current(session) {
            info!(%pubkey, "session ended during sync, discarding results");
            report.discarded = true;
            return report;
        }

        match result {
            Ok(events) => {
                report.fetched_events = events.len();
                report.deleted_events = self.store(&pubkey, events);
                report.has_any_data = report.cached_events + report.fetched_events > 0;
                if let Some(state) = self
                    .state
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .as_mut()
                {
                    state.last_synced_at = Some(Timestamp::now());
                }
                info!(
                    %pubkey,
                    fetched = report.fetched_events,
                    deleted = report.deleted_events,
                    "sync complete"
                );
            }
            Err(e) => {
                report.offline = true;
                warn!(%pubkey, error = %e, ?timeout, "network sync failed, using cache");
            }
        }

        self.set_phase(session, SyncPhase::Synced);
        self.invalidations.invalidate_all();
        report
    }

    async fn wait_for_relay_list(&self, pubkey: &PublicKey) {
        let mut rx = self.relay_list.subscribe();
        let gate = rx.wait_for(|loaded| loaded.as_ref() == Some(pubkey));
        if tokio::time::timeout(self.timeouts.relay_list_wait, gate)
            .await
            .is_err()
        {
            debug!(%pubkey, "relay list not loaded in time, syncing anyway");
        }
    }

    /// Writes fetched records and applies fetched deletions.
    ///
    /// Returns how many cached events the deletions removed.
    fn store(&self, pubkey: &PublicKey, events: Vec<Event>) -> usize {
        let (deletions, records): (Vec<Event>, Vec<Event>) = events
            .into_iter()
            .filter(|e| e.pubkey == *pubkey)
            .partition(|e| e.kind == Kind::EventDeletion);

        if let Err(e) = self.cache.put_many(&records) {
            warn!(error = %e, "failed to cache fetched events");
        }

        let mut doomed: HashSet<EventId> = HashSet::new();
        let mut removed = 0;
        for deletion in &deletions {
            doomed.extend(referenced_ids(&deletion.tags));
            for coordinate in referenced_coordinates(&deletion.tags) {
                if coordinate.pubkey != *pubkey {
                    continue;
                }
                match self.cache.remove_address(
                    coordinate.kind,
                    pubkey,
                    &coordinate.identifier,
                    deletion.created_at,
                ) {
                    Ok(n) => removed += n,
                    Err(e) => warn!(error = %e, "failed to apply address deletion"),
                }
            }
        }
        let doomed: Vec<EventId> = doomed.into_iter().collect();
        match self.cache.remove_authored(&doomed, pubkey) {
            Ok(n) => removed += n,
            Err(e) => warn!(error = %e, "failed to apply deletions"),
        }
        removed
    }

    fn set_phase(&self, session: u64, phase: SyncPhase) {
        if self.is_current(session) {
            self.phase.send_replace(phase);
        }
    }
}
