//! `SQLite` storage layer for commit-graph visibility.
//!
//! This module owns the persisted decorated commit graph: one row per commit
//! per repository, either a direct node (`nearest_uploads`) or a link node
//! (`nearest_uploads_links`), plus the uploads visible at the tip and the
//! dirty/update token pair that drives recomputation.
//!
//! ## Module Structure
//!
//! - `schema` - Database schema (DDL)
//! - `helpers` - Row conversion and upload list encoding
//! - `uploads` - Upload CRUD and the completed-upload view
//! - `dirty` - Dirty/update token operations and staleness metadata
//! - `visibility` - Recomputation and read-back of visible uploads

mod dirty;
mod helpers;
mod schema;
mod uploads;
mod visibility;

pub(crate) use schema::SCHEMA;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;

use crate::config::{Config, DEFAULT_CANCEL_CHECK_INTERVAL};
use crate::error::{Error, Result};

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// `SQLite` database wrapper for the visibility store.
///
/// The connection is wrapped in a `Mutex` so one store can be shared across
/// threads. Cross-process safety comes from `SQLite` transactions and the
/// dirty/update token protocol.
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    cancel_check_interval: usize,
}

impl Store {
    /// Open or create the visibility database.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::from_connection(Connection::open(path)?, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    /// Open the database named by a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration, otherwise the
    /// errors of [`Store::open`].
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let mut store = Self::open(&config.database_path)?;
        store.cancel_check_interval = config.cancel_check_interval;
        Ok(store)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        if path.is_some() {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }
        conn.execute_batch(SCHEMA)?;

        tracing::debug!(
            path = %path.as_deref().map_or_else(|| ":memory:".into(), |p| p.display().to_string()),
            "Opened visibility store"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            path,
            cancel_check_interval: DEFAULT_CANCEL_CHECK_INTERVAL,
        })
    }

    /// Path of the database file, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Acquire the connection lock.
    ///
    /// Returns a `MutexGuard` providing exclusive access to the underlying connection.
    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            Error::Internal(format!(
                "database connection mutex poisoned (a thread panicked while holding the lock): {e}"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("visibility.db");

        let store = Store::open(&path).expect("open");

        assert!(path.exists());
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn reopen_keeps_schema_and_data() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("visibility.db");

        {
            let store = Store::open(&path).expect("open");
            store
                .mark_repository_dirty(crate::types::RepositoryId(1))
                .expect("mark dirty");
        }

        let store = Store::open(&path).expect("reopen");
        let dirty = store.dirty_repositories().expect("dirty repositories");
        assert_eq!(dirty.len(), 1);
    }

    #[test]
    fn file_store_uses_wal_and_busy_timeout() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Store::open(&dir.path().join("visibility.db")).expect("open");
        let conn = store.connection().expect("connection");

        let journal: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("journal mode");
        let timeout_ms: i64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("busy timeout");

        assert_eq!(journal.to_lowercase(), "wal");
        assert_eq!(timeout_ms, 5_000);
    }

    #[test]
    fn from_config_applies_cancel_interval() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Config {
            database_path: dir.path().join("nav.db"),
            cancel_check_interval: 3,
            ..Config::default()
        };

        let store = Store::from_config(&config).expect("open");
        assert_eq!(store.cancel_check_interval, 3);
    }

    #[test]
    fn from_config_rejects_invalid_config() {
        let config = Config {
            cancel_check_interval: 0,
            ..Config::default()
        };

        assert!(matches!(Store::from_config(&config), Err(Error::Config(_))));
    }

    #[test]
    fn in_memory_store_has_no_path() {
        let store = Store::open_in_memory().expect("open");
        assert!(store.path().is_none());
    }
}
