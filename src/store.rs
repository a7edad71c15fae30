//! Shared error type for the `SQLite` stores.

use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use thiserror::Error;

/// Errors from the local event cache and the settings store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage error (lock poisoning and similar).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database error from `SQLite`.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be interpreted.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Locks a connection, mapping poisoning to [`StoreError::Storage`].
pub(crate) fn lock(conn: &Mutex<Connection>) -> StoreResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| StoreError::Storage(format!("Failed to acquire database lock: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_display() {
        let error = StoreError::Storage("disk full".to_string());
        assert_eq!(error.to_string(), "Storage error: disk full");
    }

    #[test]
    fn invalid_data_error_display() {
        let error = StoreError::InvalidData("bad category".to_string());
        assert_eq!(error.to_string(), "Invalid data: bad category");
    }

    #[test]
    fn database_error_converts() {
        let conn = Connection::open_in_memory().unwrap();
        let err: StoreError = conn.execute("NOT SQL", []).unwrap_err().into();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[test]
    fn lock_succeeds_on_healthy_mutex() {
        let conn = Mutex::new(Connection::open_in_memory().unwrap());
        assert!(lock(&conn).is_ok());
    }
}
