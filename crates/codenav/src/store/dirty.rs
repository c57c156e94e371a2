//! Dirty/update token operations.
//!
//! Every repository carries two non-decreasing integers. `dirty_token` is
//! bumped whenever new data invalidates the persisted visibility graph;
//! `update_token` is advanced after a recomputation that observed a given
//! dirty token. The repository is stale while the two differ.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;

use super::Store;
use crate::error::Result;
use crate::types::{CommitGraphMetadata, RepositoryId};

impl Store {
    /// Mark a repository's visibility data as out of date.
    ///
    /// Creates the token pair on first use. Each call performs exactly one
    /// atomic increment and returns the resulting dirty token, so concurrent
    /// callers always observe distinct values.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn mark_repository_dirty(&self, repository_id: RepositoryId) -> Result<i64> {
        let conn = self.connection()?;
        let token: i64 = conn.query_row(
            "INSERT INTO dirty_repositories (repository_id, dirty_token, update_token)
             VALUES (?1, 1, 0)
             ON CONFLICT (repository_id) DO UPDATE SET dirty_token = dirty_token + 1
             RETURNING dirty_token",
            [repository_id.as_i64()],
            |row| row.get(0),
        )?;
        tracing::debug!(repository_id = %repository_id, dirty_token = token, "Marked repository dirty");
        Ok(token)
    }

    /// Repositories whose tokens differ, mapped to their current dirty token.
    ///
    /// This is the recomputation work queue: pass the returned token to
    /// [`Store::calculate_visible_uploads`] to clear the repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn dirty_repositories(&self) -> Result<HashMap<RepositoryId, i64>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT repository_id, dirty_token FROM dirty_repositories
             WHERE dirty_token != update_token",
        )?;
        let dirty = stmt
            .query_map([], |row| Ok((RepositoryId(row.get(0)?), row.get(1)?)))?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(dirty)
    }

    /// Staleness of a repository and when it was last recomputed.
    ///
    /// A repository that was never marked dirty is reported as fresh with no
    /// update time.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn commit_graph_metadata(&self, repository_id: RepositoryId) -> Result<CommitGraphMetadata> {
        let conn = self.connection()?;
        let row: Option<(i64, i64, Option<DateTime<Utc>>)> = conn
            .query_row(
                "SELECT dirty_token, update_token, updated_at FROM dirty_repositories
                 WHERE repository_id = ?1",
                [repository_id.as_i64()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        Ok(row.map_or_else(CommitGraphMetadata::default, |(dirty, update, updated_at)| {
            CommitGraphMetadata {
                stale: dirty != update,
                updated_at,
            }
        }))
    }
}
