//! `SQLite` persistence for relay settings and category policy.
//!
//! Everything here is local device state. The relay list is also
//! published as a NIP-65 event, but the private relay set and the
//! per-category policy never leave the device.

// SQLite operations need to hold the lock for the duration of the operation.
#![allow(clippy::significant_drop_tightening)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::event::Category;
use crate::store::{lock, StoreResult};

/// One stored relay list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRelay {
    /// Relay URL as entered.
    pub url: String,
    /// Read flag.
    pub read: bool,
    /// Write flag.
    pub write: bool,
}

/// Stored policy for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredCategoryPolicy {
    /// Whether new records are encrypted.
    pub encrypted: bool,
    /// Per-relay enablement overrides, keyed by URL.
    pub relay_overrides: BTreeMap<String, bool>,
}

/// `SQLite`-based settings storage.
pub struct SettingsStorage {
    conn: Mutex<Connection>,
}

impl SettingsStorage {
    /// Opens (or creates) the settings database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or initialized.
    pub fn new(path: &Path) -> StoreResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Creates an in-memory settings store.
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
            -- The user's relay list, in preference order
            CREATE TABLE IF NOT EXISTS relays (
                url TEXT PRIMARY KEY,
                read INTEGER NOT NULL DEFAULT 1,
                write INTEGER NOT NULL DEFAULT 1,
                position INTEGER NOT NULL
            );

            -- Relays the user trusts with sensitive reads
            CREATE TABLE IF NOT EXISTS private_relays (
                url TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS category_policy (
                category TEXT PRIMARY KEY,
                encrypted INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS category_relay_overrides (
                category TEXT NOT NULL,
                url TEXT NOT NULL,
                enabled INTEGER NOT NULL,
                PRIMARY KEY (category, url)
            );

            -- Scalar settings (caching relay, relay list timestamp)
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ==================== Relay List ====================

    /// Loads the relay list in stored order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn load_relays(&self) -> StoreResult<Vec<StoredRelay>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare("SELECT url, read, write FROM relays ORDER BY position")?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredRelay {
                url: row.get(0)?,
                read: row.get(1)?,
                write: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Replaces the whole relay list.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn save_relays(&self, relays: &[StoredRelay]) -> StoreResult<()> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM relays", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO relays (url, read, write, position) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, relay) in relays.iter().enumerate() {
                stmt.execute(params![
                    relay.url,
                    relay.read,
                    relay.write,
                    i64::try_from(position).unwrap_or(i64::MAX)
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ==================== Private Relays ====================

    /// Loads the private relay set.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn load_private_relays(&self) -> StoreResult<BTreeSet<String>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare("SELECT url FROM private_relays")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<BTreeSet<_>, _>>()?)
    }

    /// Adds or removes a relay from the private set.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_private_relay(&self, url: &str, private: bool) -> StoreResult<()> {
        let conn = lock(&self.conn)?;
        if private {
            conn.execute(
                "INSERT OR IGNORE INTO private_relays (url) VALUES (?1)",
                params![url],
            )?;
        } else {
            conn.execute("DELETE FROM private_relays WHERE url = ?1", params![url])?;
        }
        Ok(())
    }

    // ==================== Category Policy ====================

    /// Loads every stored category policy.
    ///
    /// Rows naming an unknown category are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn load_category_policies(&self) -> StoreResult<BTreeMap<Category, StoredCategoryPolicy>> {
        let conn = lock(&self.conn)?;
        let mut policies: BTreeMap<Category, StoredCategoryPolicy> = BTreeMap::new();

        let mut stmt = conn.prepare("SELECT category, encrypted FROM category_policy")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)))?;
        for row in rows {
            let (name, encrypted) = row?;
            match Category::parse(&name) {
                Some(category) => policies.entry(category).or_default().encrypted = encrypted,
                None => warn!(category = %name, "skipping unknown category policy"),
            }
        }

        let mut stmt =
            conn.prepare("SELECT category, url, enabled FROM category_relay_overrides")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
            ))
        })?;
        for row in rows {
            let (name, url, enabled) = row?;
            match Category::parse(&name) {
                Some(category) => {
                    policies
                        .entry(category)
                        .or_default()
                        .relay_overrides
                        .insert(url, enabled);
                }
                None => warn!(category = %name, "skipping unknown relay override"),
            }
        }

        Ok(policies)
    }

    /// Stores whether a category is encrypted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_encrypted(&self, category: Category, encrypted: bool) -> StoreResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            r"
            INSERT INTO category_policy (category, encrypted) VALUES (?1, ?2)
            ON CONFLICT(category) DO UPDATE SET encrypted = excluded.encrypted
            ",
            params![category.as_str(), encrypted],
        )?;
        Ok(())
    }

    /// Stores a per-category relay override.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_relay_override(&self, category: Category, url: &str, enabled: bool) -> StoreResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            r"
            INSERT INTO category_relay_overrides (category, url, enabled) VALUES (?1, ?2, ?3)
            ON CONFLICT(category, url) DO UPDATE SET enabled = excluded.enabled
            ",
            params![category.as_str(), url, enabled],
        )?;
        Ok(())
    }

    // ==================== Scalar Settings ====================

    /// Reads a scalar setting.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = lock(&self.conn)?;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Writes a scalar setting, or removes it when `value` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_setting(&self, key: &str, value: Option<&str>) -> StoreResult<()> {
        let conn = lock(&self.conn)?;
        match value {
            Some(value) => conn.execute(
                r"
                INSERT INTO settings (key, value) VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                ",
                params![key, value],
            )?,
            None => conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?,
        };
        Ok(())
    }
}
