//! `SQLite` event cache.
//!
//! An append-only log of every event the tracker has seen, indexed by
//! `(kind, pubkey)`. Rows are never updated in place: a newer version of
//! an addressable record is simply another row, and the reader picks the
//! winner (see [`super::resolve_latest`]). The only removals are locally
//! applied deletions.

// SQLite operations need to hold the lock for the duration of the operation.
#![allow(clippy::significant_drop_tightening)]

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use nostr::{Event, EventId, JsonUtil, Kind, PublicKey, Timestamp};
use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::event::identifier;
use crate::store::{lock, StoreResult};

/// An event as held in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEvent {
    /// The signed event.
    pub event: Event,
    /// When the cache first stored it (Unix timestamp).
    pub cached_at: i64,
}

/// `SQLite`-backed local event cache.
pub struct EventCache {
    conn: Mutex<Connection>,
}

impl EventCache {
    /// Opens (or creates) the cache database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or initialized.
    pub fn new(path: &Path) -> StoreResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Creates an in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                kind INTEGER NOT NULL,
                pubkey TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                d_tag TEXT,
                raw TEXT NOT NULL,
                cached_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_kind_pubkey
                ON events (kind, pubkey);
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Stores events, ignoring any id already present.
    ///
    /// Returns how many were new.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails. Nothing from the
    /// batch is stored in that case.
    pub fn put_many(&self, events: &[Event]) -> StoreResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        let now = Utc::now().timestamp();
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                r"
                INSERT OR IGNORE INTO events (id, kind, pubkey, created_at, d_tag, raw, cached_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
            )?;
            for event in events {
                inserted += stmt.execute(params![
                    event.id.to_hex(),
                    i64::from(event.kind.as_u16()),
                    event.pubkey.to_hex(),
                    timestamp_to_sql(event.created_at),
                    identifier(&event.tags),
                    event.as_json(),
                    now,
                ])?;
            }
        }
        tx.commit()?;

        debug!(offered = events.len(), inserted, "events cached");
        Ok(inserted)
    }

    /// Returns every cached event by `pubkey` whose kind is in `kinds`.
    ///
    /// Rows that no longer parse are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_by_kind_author(
        &self,
        kinds: &[Kind],
        pubkey: &PublicKey,
    ) -> StoreResult<Vec<CachedEvent>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare_cached(
            r"
            SELECT id, raw, cached_at FROM events
            WHERE kind = ?1 AND pubkey = ?2
            ORDER BY created_at DESC, id DESC
            ",
        )?;

        let author = pubkey.to_hex();
        let mut out = Vec::new();
        for kind in kinds {
            let rows = stmt.query_map(params![i64::from(kind.as_u16()), author], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;
            for row in rows {
                let (id, raw, cached_at) = row?;
                match Event::from_json(&raw) {
                    Ok(event) => out.push(CachedEvent { event, cached_at }),
                    Err(e) => warn!(%id, error = %e, "skipping corrupt cached event"),
                }
            }
        }
        Ok(out)
    }

    /// Ids of cached versions of the addressable record `(kind, pubkey, d)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn ids_for_identifier(
        &self,
        kind: Kind,
        pubkey: &PublicKey,
        d: &str,
    ) -> StoreResult<Vec<EventId>> {
        self.select_ids(
            "SELECT id FROM events WHERE kind = ?1 AND pubkey = ?2 AND d_tag = ?3",
            params![i64::from(kind.as_u16()), pubkey.to_hex(), d],
        )
    }

    /// Ids of cached events by `pubkey` of `kind` created exactly at `at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn ids_created_at(
        &self,
        kind: Kind,
        pubkey: &PublicKey,
        at: Timestamp,
    ) -> StoreResult<Vec<EventId>> {
        self.select_ids(
            "SELECT id FROM events WHERE kind = ?1 AND pubkey = ?2 AND created_at = ?3",
            params![i64::from(kind.as_u16()), pubkey.to_hex(), timestamp_to_sql(at)],
        )
    }

    /// Removes events by id. Returns how many were present.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn remove(&self, ids: &[EventId]) -> StoreResult<usize> {
        self.remove_where(ids, None)
    }

    /// Removes events by id, but only those authored by `author`.
    ///
    /// NIP-09 deletions are honored for the deleter's own events only.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn remove_authored(&self, ids: &[EventId], author: &PublicKey) -> StoreResult<usize> {
        self.remove_where(ids, Some(author))
    }

    fn remove_where(&self, ids: &[EventId], author: Option<&PublicKey>) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let author = author.map(PublicKey::to_hex);
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare_cached(
                "DELETE FROM events WHERE id = ?1 AND (?2 IS NULL OR pubkey = ?2)",
            )?;
            for id in ids {
                removed += stmt.execute(params![id.to_hex(), author])?;
            }
        }
        tx.commit()?;
        debug!(removed, "cached events removed");
        Ok(removed)
    }

    /// Removes versions of `(kind, pubkey, d)` created at or before `until`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn remove_address(
        &self,
        kind: Kind,
        pubkey: &PublicKey,
        d: &str,
        until: Timestamp,
    ) -> StoreResult<usize> {
        let conn = lock(&self.conn)?;
        let removed = conn.execute(
            "DELETE FROM events WHERE kind = ?1 AND pubkey = ?2 AND d_tag = ?3 AND created_at <= ?4",
            params![
                i64::from(kind.as_u16()),
                pubkey.to_hex(),
                d,
                timestamp_to_sql(until)
            ],
        )?;
        Ok(removed)
    }

    /// Number of cached events.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn len(&self) -> StoreResult<usize> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Returns true if nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    fn select_ids(&self, sql: &str, params: impl rusqlite::Params) -> StoreResult<Vec<EventId>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            let hex = row?;
            match EventId::from_hex(&hex) {
                Ok(id) => ids.push(id),
                Err(e) => warn!(id = %hex, error = %e, "skipping corrupt cached id"),
            }
        }
        Ok(ids)
    }
}

#[allow(clippy::cast_possible_wrap)]
fn timestamp_to_sql(ts: Timestamp) -> i64 {
    ts.as_secs() as i64
}
