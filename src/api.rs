//! The tracker facade.
//!
//! [`Tracker`] is the one object a host application holds. It owns the
//! cache, the settings, the relay pool and the sync machinery, and wires
//! them together:
//!
//! ```text
//! open ─► login ─► list / save / delete / query ... ─► logout ─► shutdown
//!            │
//!            ├─ relay list load ──┐
//!            └─ SyncOrchestrator ─┴─ (gated on the relay list)
//! ```
//!
//! Nothing here blocks rendering: reads come from the cache, and network
//! trouble shows up as a thinner result, not an error.

use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use nostr::{Event, Filter, Kind, PublicKey};
use tracing::{debug, info, warn};

use crate::cache::{resolve_latest, EventCache};
use crate::config::TrackerConfig;
use crate::deletion::{DeletionResolver, PendingDeletion, SiblingScope};
use crate::error::{Result, TrackerError};
use crate::event::kinds::is_addressable;
use crate::event::{Category, Signer};
use crate::policy::{PrivacyPolicy, RelayDirectory, SettingsStorage};
use crate::records::{self, Record, RecordDraft};
use crate::relay::{PublishResult, RelayConnector, RelayPool, SdkConnector, Visibility};
use crate::routing::{EventRouter, RequestRouter, RoutingContext};
use crate::store::StoreError;
use crate::sync::{InvalidationBus, SyncOrchestrator, SyncPhase, SyncReport};

const EVENTS_DB: &str = "events.db";
const SETTINGS_DB: &str = "settings.db";
const TOR_DIR: &str = "tor";
const QUARANTINE_SUFFIX: &str = "corrupt";

/// Opens the on-disk cache, never failing on a bad file.
///
/// An unreadable cache is moved aside and recreated. If that fails too,
/// the cache lives in memory for this run and sync refills it.
fn open_cache(path: &Path) -> Result<EventCache> {
    let error = match EventCache::new(path) {
        Ok(cache) => return Ok(cache),
        Err(e) => e,
    };
    warn!(path = %path.display(), %error, "event cache unreadable, starting empty");

    let quarantine = path.with_extension(format!("db.{QUARANTINE_SUFFIX}"));
    match fs::rename(path, &quarantine) {
        Ok(()) => match EventCache::new(path) {
            Ok(cache) => return Ok(cache),
            Err(e) => warn!(error = %e, "failed to recreate event cache"),
        },
        Err(e) => warn!(error = %e, "failed to move event cache aside"),
    }

    warn!("falling back to an in-memory event cache");
    Ok(EventCache::in_memory()?)
}

/// Process-wide tracker service.
pub struct Tracker {
    config: TrackerConfig,
    cache: Arc<EventCache>,
    policy: Arc<PrivacyPolicy>,
    directory: Arc<RelayDirectory>,
    context: Arc<RoutingContext>,
    pool: Arc<RelayPool>,
    requests: RequestRouter,
    events: EventRouter,
    orchestrator: SyncOrchestrator,
    deletions: DeletionResolver,
    invalidations: InvalidationBus,
    signer: RwLock<Option<Arc<dyn Signer>>>,
}

impl Tracker {
    /// Opens a tracker with the production relay transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or local storage
    /// cannot be opened.
    pub fn open(config: TrackerConfig) -> Result<Self> {
        let connector = if config.use_tor {
            let dir = config.data_dir.as_ref().ok_or_else(|| {
                TrackerError::InvalidConfig("Tor needs a data directory".to_string())
            })?;
            SdkConnector::with_tor(&dir.join(TOR_DIR))
        } else {
            SdkConnector::new()
        };
        Self::open_with(config, Arc::new(connector))
    }

    /// Opens a tracker over a custom relay transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or local storage
    /// cannot be opened.
    pub fn open_with(config: TrackerConfig, connector: Arc<dyn RelayConnector>) -> Result<Self> {
        let (cache, settings) = match &config.data_dir {
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|e| {
                    StoreError::Storage(format!("Failed to create {}: {e}", dir.display()))
                })?;
                (
                    open_cache(&dir.join(EVENTS_DB))?,
                    SettingsStorage::new(&dir.join(SETTINGS_DB))?,
                )
            }
            None => (EventCache::in_memory()?, SettingsStorage::in_memory()?),
        };
        let cache = Arc::new(cache);
        let settings = Arc::new(settings);

        let policy = Arc::new(PrivacyPolicy::load(Arc::clone(&settings))?);
        let directory = Arc::new(RelayDirectory::load(
            settings,
            Arc::clone(&policy),
            &config.default_relay_urls()?,
        )?);
        if directory.caching_relay().is_none() {
            if let Some(url) = config.caching_relay_url()? {
                directory.set_caching_relay(Some(url))?;
            }
        }

        let context = Arc::new(RoutingContext::new(
            Arc::clone(&directory),
            Arc::clone(&policy),
        ));
        let invalidations = InvalidationBus::new();
        let pool = Arc::new(
            RelayPool::new(connector, invalidations.clone())
                .with_publish_timeout(config.publish_timeout()),
        );
        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&cache),
            Arc::clone(&pool),
            RequestRouter::new(Arc::clone(&context)),
            invalidations.clone(),
            config.sync_timeouts(),
        );
        let deletions = DeletionResolver::new(
            Arc::clone(&pool),
            Arc::clone(&context),
            Arc::clone(&cache),
            config.query_timeout(),
        );

        info!(
            persistent = config.data_dir.is_some(),
            tor = config.use_tor,
            relays = directory.relays().len(),
            "tracker opened"
        );

        Ok(Self {
            requests: RequestRouter::new(Arc::clone(&context)),
            events: EventRouter::new(Arc::clone(&context)),
            config,
            cache,
            policy,
            directory,
            context,
            pool,
            orchestrator,
            deletions,
            invalidations,
            signer: RwLock::new(None),
        })
    }

    // ==================== Session ====================

    /// Logs in with `signer` and runs the login sync.
    ///
    /// A different user already logged in is logged out first. The
    /// relay list load and the sync run side by side; the sync waits for
    /// the relay list up to its configured limit.
    ///
    /// # Errors
    ///
    /// Returns an error only if the signer cannot produce a public key.
    /// Network trouble is reported in the [`SyncReport`].
    pub async fn login(&self, signer: Arc<dyn Signer>) -> Result<SyncReport> {
        let pubkey = signer.public_key().await?;
        if let Some(current) = self.current_user() {
            if current != pubkey {
                info!(%current, next = %pubkey, "switching account");
                self.logout().await;
            }
        }

        *self.signer.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&signer));
        self.pool.set_signer(Some(Arc::clone(&signer)));
        self.context.set_user(Some(pubkey));

        let session = self.orchestrator.begin_session(pubkey);
        info!(%pubkey, signer = ?signer.kind(), "logged in");

        let ((), report) = tokio::join!(
            self.load_relay_list(session, pubkey),
            self.orchestrator.run(session, pubkey, signer.kind()),
        );
        Ok(report)
    }

    /// Re-runs the sync for the logged-in user.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::NotLoggedIn`] without a session.
    pub async fn resync(&self) -> Result<SyncReport> {
        let signer = self.signer()?;
        let state = self.orchestrator.state().ok_or(TrackerError::NotLoggedIn)?;
        let session = self.orchestrator.session();
        Ok(self
            .orchestrator
            .run(session, state.pubkey, signer.kind())
            .await)
    }

    /// Ends the session and rebuilds the pool so nothing authenticated as
    /// the old user survives.
    pub async fn logout(&self) {
        self.orchestrator.end_session();
        self.context.set_user(None);
        self.pool.set_signer(None);
        *self.signer.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.pool.close().await;
        self.pool.open();
        self.invalidations.invalidate_all();
        info!("logged out");
    }

    /// Closes every connection. The tracker is unusable for network
    /// operations afterwards.
    pub async fn shutdown(&self) {
        self.orchestrator.end_session();
        self.pool.set_signer(None);
        self.pool.close().await;
        info!("tracker shut down");
    }

    /// The logged-in user.
    #[must_use]
    pub fn current_user(&self) -> Option<PublicKey> {
        self.context.user()
    }

    /// Whether the relay list has been loaded for `pubkey` this session.
    #[must_use]
    pub fn relay_list_synced_for(&self, pubkey: &PublicKey) -> bool {
        self.orchestrator.relay_list_synced_for(pubkey)
    }

    /// Current login sync phase.
    #[must_use]
    pub fn sync_phase(&self) -> SyncPhase {
        self.orchestrator.phase()
    }

    /// Applies a host visibility change to the relay pool.
    pub async fn set_visibility(&self, visibility: Visibility) {
        self.pool.set_visibility(visibility).await;
    }

    // ==================== Records ====================

    /// The current version of every record in `category`, newest first.
    ///
    /// Reads only the cache. Records that cannot be decrypted are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::NotLoggedIn`] without a session.
    pub async fn list_records(&self, category: Category) -> Result<Vec<Record>> {
        let pubkey = self.current_user().ok_or(TrackerError::NotLoggedIn)?;
        let signer = self.signer()?;

        let cached = self
            .cache
            .get_by_kind_author(&category.kinds(), &pubkey)
            .unwrap_or_else(|e| {
                warn!(error = %e, "cache read failed, listing nothing");
                Vec::new()
            });

        let mut records = Vec::new();
        for event in resolve_latest(cached.into_iter().map(|c| c.event)) {
            match records::decode(&event, signer.as_ref()).await {
                Ok(record) => records.push(record),
                Err(e) => warn!(event_id = %event.id, error = %e, "skipping undecodable record"),
            }
        }
        Ok(records)
    }

    /// Publishes a record, encrypting it if its category says so.
    ///
    /// The event is cached locally whatever the relays say.
    ///
    /// # Errors
    ///
    /// Returns an error without a session, if signing or encryption fails,
    /// or if the pool is closed.
    pub async fn save_record(&self, draft: &RecordDraft) -> Result<PublishResult> {
        let signer = self.signer()?;
        let encrypt = self.policy.is_encrypted(draft.category);
        let event = records::encode(draft, signer.as_ref(), encrypt).await?;

        let urls = self.events.route(&event);
        let result = self.pool.publish(&event, &urls).await?;

        if let Err(e) = self.cache.put_many(std::slice::from_ref(&event)) {
            warn!(error = %e, "failed to cache published record");
        }
        self.invalidations.invalidate(draft.category);

        debug!(
            event_id = %event.id,
            category = %draft.category,
            encrypt,
            accepted = result.success_count(),
            "record saved"
        );
        Ok(result)
    }

    /// Deletes every copy of `record` that can be found.
    ///
    /// # Errors
    ///
    /// Returns an error without a session, if signing fails, or if the
    /// pool is closed.
    pub async fn delete_record(&self, record: &Record) -> Result<PublishResult> {
        let scope = match &record.identifier {
            Some(d) if is_addressable(record.kind) => SiblingScope::Identifier(d.clone()),
            _ => SiblingScope::CreatedAt(record.created_at),
        };
        self.delete(record.category, record.kind, scope, Some(record)).await
    }

    /// Deletes every event of `kind` by the user matching `scope`.
    ///
    /// # Errors
    ///
    /// Returns an error without a session, if signing fails, or if the
    /// pool is closed.
    pub async fn delete_matching(
        &self,
        category: Category,
        kind: Kind,
        scope: SiblingScope,
    ) -> Result<PublishResult> {
        self.delete(category, kind, scope, None).await
    }

    async fn delete(
        &self,
        category: Category,
        kind: Kind,
        scope: SiblingScope,
        known: Option<&Record>,
    ) -> Result<PublishResult> {
        let signer = self.signer()?;
        let pubkey = self.current_user().ok_or(TrackerError::NotLoggedIn)?;

        let mut sibling_ids = self.deletions.find_sibling_ids(kind, &pubkey, &scope).await;
        if let Some(record) = known {
            if !sibling_ids.contains(&record.id) {
                sibling_ids.push(record.id);
            }
        }

        let pending = PendingDeletion {
            kind,
            pubkey,
            scope,
            sibling_ids,
        };
        let event = signer
            .sign_event(pending.builder()?.build(pubkey))
            .await?;

        // Old copies may sit on relays the category has since opted out of
        let urls = self.events.route_category(None);
        let result = self.pool.publish(&event, &urls).await?;

        if let Err(e) = self.cache.remove(&pending.sibling_ids) {
            warn!(error = %e, "failed to drop deleted records from cache");
        }
        if let SiblingScope::Identifier(d) = &pending.scope {
            if let Err(e) = self.cache.remove_address(kind, &pubkey, d, event.created_at) {
                warn!(error = %e, "failed to drop deleted address from cache");
            }
        }
        self.invalidations.invalidate(category);

        info!(
            %category,
            siblings = pending.sibling_ids.len(),
            accepted = result.success_count(),
            "record deleted"
        );
        Ok(result)
    }

    // ==================== Relays ====================

    /// Runs an ad hoc read through the request router, caching what comes
    /// back.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is closed or no relay answered.
    pub async fn query(&self, filters: &[Filter]) -> Result<Vec<Event>> {
        let urls = self.requests.route(filters);
        let events = self
            .pool
            .query(&urls, filters, self.config.query_timeout())
            .await?;

        match self.cache.put_many(&events) {
            Ok(0) => {}
            Ok(_) => self.invalidations.invalidate_all(),
            Err(e) => warn!(error = %e, "failed to cache query results"),
        }
        Ok(events)
    }

    /// Publishes the public part of the relay list as a NIP-65 event.
    ///
    /// # Errors
    ///
    /// Returns an error without a session, if signing fails, or if the
    /// pool is closed.
    pub async fn publish_relay_list(&self) -> Result<PublishResult> {
        let signer = self.signer()?;
        let pubkey = self.current_user().ok_or(TrackerError::NotLoggedIn)?;
        let event = signer
            .sign_event(self.directory.relay_list_builder()?.build(pubkey))
            .await?;

        self.directory.apply_relay_list_event(&event)?;
        let urls = self.events.route_category(None);
        Ok(self.pool.publish(&event, &urls).await?)
    }

    async fn load_relay_list(&self, session: u64, pubkey: PublicKey) {
        let filters = [Filter::new().author(pubkey).kind(Kind::RelayList).limit(1)];
        let urls = self.requests.route(&filters);

        match self
            .pool
            .query(&urls, &filters, self.config.query_timeout())
            .await
        {
            Ok(events) => {
                let latest = events
                    .into_iter()
                    .filter(|e| e.pubkey == pubkey && e.kind == Kind::RelayList)
                    .max_by_key(|e| e.created_at);
                if let Some(event) = latest {
                    if self.orchestrator.is_current(session) {
                        if let Err(e) = self.directory.apply_relay_list_event(&event) {
                            warn!(error = %e, "failed to apply relay list");
                        }
                    }
                }
            }
            Err(e) => debug!(error = %e, "relay list fetch failed, keeping current list"),
        }

        // The gate opens once the attempt is over, found or not
        if self.orchestrator.is_current(session) {
            self.orchestrator.mark_relay_list_loaded(&pubkey);
        }
    }

    // ==================== Accessors ====================

    fn signer(&self) -> Result<Arc<dyn Signer>> {
        self.signer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(TrackerError::NotLoggedIn)
    }

    /// The configuration the tracker was opened with.
    #[must_use]
    pub const fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Per-category privacy policy.
    #[must_use]
    pub const fn policy(&self) -> &Arc<PrivacyPolicy> {
        &self.policy
    }

    /// The user's relay list.
    #[must_use]
    pub const fn directory(&self) -> &Arc<RelayDirectory> {
        &self.directory
    }

    /// The relay pool.
    #[must_use]
    pub const fn pool(&self) -> &Arc<RelayPool> {
        &self.pool
    }

    /// The local event cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<EventCache> {
        &self.cache
    }

    /// Invalidation signals for views rendering from the cache.
    #[must_use]
    pub const fn invalidations(&self) -> &InvalidationBus {
        &self.invalidations
    }

    /// Read router, for callers that want to see where a read would go.
    #[must_use]
    pub const fn request_router(&self) -> &RequestRouter {
        &self.requests
    }

    /// Write router.
    #[must_use]
    pub const fn event_router(&self) -> &EventRouter {
        &self.events
    }

    /// Sibling resolver used by deletions.
    #[must_use]
    pub const fn deletion_resolver(&self) -> &DeletionResolver {
        &self.deletions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeysSigner;
    use crate::relay::memory::{MemoryNetwork, MemoryRelayConfig};
    use nostr::Keys;

    const RELAY: &str = "wss://relay.example.com";

    fn tracker(network: &MemoryNetwork) -> Tracker {
        let config = TrackerConfig::new().with_default_relays([RELAY]);
        Tracker::open_with(config, Arc::new(network.clone())).unwrap()
    }

    fn network() -> MemoryNetwork {
        let network = MemoryNetwork::new();
        network.add_relay(RELAY, MemoryRelayConfig::default());
        network
    }

    #[tokio::test]
    async fn record_operations_need_login() {
        let tracker = tracker(&network());

        assert!(matches!(
            tracker.list_records(Category::Pets).await,
            Err(TrackerError::NotLoggedIn)
        ));
        assert!(matches!(
            tracker
                .save_record(&RecordDraft::entity(Category::Pets, "rex", "{}"))
                .await,
            Err(TrackerError::NotLoggedIn)
        ));
        assert!(matches!(tracker.resync().await, Err(TrackerError::NotLoggedIn)));
    }

    #[tokio::test(start_paused = true)]
    async fn login_marks_relay_list_loaded() {
        let tracker = tracker(&network());
        let signer = Arc::new(KeysSigner::new(Keys::generate()));
        let pubkey = signer.public_key().await.unwrap();

        let report = tracker.login(signer).await.unwrap();

        assert!(!report.offline);
        assert!(tracker.relay_list_synced_for(&pubkey));
        assert_eq!(tracker.sync_phase(), SyncPhase::Synced);
    }

    #[tokio::test(start_paused = true)]
    async fn save_then_list_round_trips() {
        let tracker = tracker(&network());
        tracker
            .login(Arc::new(KeysSigner::new(Keys::generate())))
            .await
            .unwrap();

        tracker
            .save_record(&RecordDraft::entity(Category::Pets, "rex", r#"{"name":"Rex"}"#))
            .await
            .unwrap();
        let records = tracker.list_records(Category::Pets).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, r#"{"name":"Rex"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_clears_session() {
        let tracker = tracker(&network());
        let signer = Arc::new(KeysSigner::new(Keys::generate()));
        let pubkey = signer.public_key().await.unwrap();
        tracker.login(signer).await.unwrap();

        tracker.logout().await;

        assert_eq!(tracker.current_user(), None);
        assert!(!tracker.relay_list_synced_for(&pubkey));
        assert_eq!(tracker.sync_phase(), SyncPhase::Idle);
        assert!(tracker.pool().is_open());
    }

    #[test]
    fn tor_without_data_dir_is_invalid() {
        let config = TrackerConfig::new().with_tor(true);
        assert!(matches!(
            Tracker::open(config),
            Err(TrackerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn corrupt_cache_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EVENTS_DB);
        fs::write(&path, b"definitely not sqlite").unwrap();

        let cache = open_cache(&path).unwrap();

        assert!(cache.is_empty().unwrap());
        assert!(dir.path().join("events.db.corrupt").exists());
    }

    #[test]
    fn persistent_tracker_creates_databases() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig::new()
            .with_data_dir(dir.path().join("hearth"))
            .with_default_relays([RELAY]);

        let _tracker = Tracker::open_with(config, Arc::new(network())).unwrap();

        assert!(dir.path().join("hearth").join(EVENTS_DB).exists());
        assert!(dir.path().join("hearth").join(SETTINGS_DB).exists());
    }
}
