//! Recomputation and read-back of visible uploads.
//!
//! ## Recomputation
//!
//! [`Store::calculate_visible_uploads`] runs in a single immediate
//! transaction:
//!
//! 1. Load the completed uploads of the repository into a `CommitGraphView`.
//! 2. Resolve a `VisibilityGraph` and stream its envelopes into per-run
//!    scratch tables.
//! 3. Diff the scratch tables against the persisted rows: changed rows are
//!    updated, new rows inserted, vanished rows deleted.
//! 4. Replace the uploads visible at the tip.
//! 5. Advance `update_token` to `MAX(update_token, dirty_token)`.
//!
//! Any error or cancellation drops the transaction, which rolls everything
//! back, scratch tables included.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::helpers::{column_distance, deserialize_upload_metas, serialize_upload_metas};
use super::schema::{DROP_SCRATCH_SCHEMA, SCRATCH_SCHEMA};
use super::uploads::{load_commit_graph_view, upload_in};
use super::Store;
use crate::commitgraph::{CommitGraph, Envelope, VisibilityGraph};
use crate::error::{Error, Result};
use crate::types::{RepositoryId, Upload, UploadId, UploadMeta, UploadState, VisibilityUpdate};

const UPDATE_NODES: &str = "
UPDATE nearest_uploads
SET uploads = t.uploads
FROM temp.t_nearest_uploads AS t
WHERE nearest_uploads.repository_id = ?1
  AND nearest_uploads.commit_hash = t.commit_hash
  AND nearest_uploads.uploads != t.uploads";

const INSERT_NODES: &str = "
INSERT INTO nearest_uploads (repository_id, commit_hash, uploads)
SELECT ?1, t.commit_hash, t.uploads
FROM temp.t_nearest_uploads AS t
WHERE NOT EXISTS (
    SELECT 1 FROM nearest_uploads AS nu
    WHERE nu.repository_id = ?1 AND nu.commit_hash = t.commit_hash
)";

const DELETE_NODES: &str = "
DELETE FROM nearest_uploads
WHERE repository_id = ?1
  AND commit_hash NOT IN (SELECT commit_hash FROM temp.t_nearest_uploads)";

const UPDATE_LINKS: &str = "
UPDATE nearest_uploads_links
SET ancestor_commit_hash = t.ancestor_commit_hash, distance = t.distance
FROM temp.t_nearest_uploads_links AS t
WHERE nearest_uploads_links.repository_id = ?1
  AND nearest_uploads_links.commit_hash = t.commit_hash
  AND (nearest_uploads_links.ancestor_commit_hash != t.ancestor_commit_hash
       OR nearest_uploads_links.distance != t.distance)";

const INSERT_LINKS: &str = "
INSERT INTO nearest_uploads_links (repository_id, commit_hash, ancestor_commit_hash, distance)
SELECT ?1, t.commit_hash, t.ancestor_commit_hash, t.distance
FROM temp.t_nearest_uploads_links AS t
WHERE NOT EXISTS (
    SELECT 1 FROM nearest_uploads_links AS l
    WHERE l.repository_id = ?1 AND l.commit_hash = t.commit_hash
)";

const DELETE_LINKS: &str = "
DELETE FROM nearest_uploads_links
WHERE repository_id = ?1
  AND commit_hash NOT IN (SELECT commit_hash FROM temp.t_nearest_uploads_links)";

impl Store {
    /// Recompute which uploads are visible from every commit of a repository.
    ///
    /// `commit_graph` is the repository's full DAG and `tip_commit` the tip of
    /// its default branch. A non-zero `dirty_token` (as returned by
    /// [`Store::dirty_repositories`]) clears staleness up to that token;
    /// `update_token` never moves backwards.
    ///
    /// All changes commit together or not at all. Safe to re-run: a second run
    /// over unchanged inputs touches no visibility rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires during the traversal or
    /// before commit, and
    /// database or serialization errors otherwise. In every error case the
    /// persisted state is unchanged.
    pub fn calculate_visible_uploads(
        &self,
        repository_id: RepositoryId,
        commit_graph: &CommitGraph,
        tip_commit: &str,
        dirty_token: i64,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<VisibilityUpdate> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let view = load_commit_graph_view(&tx, repository_id)?;
        trace!(
            repository_id = %repository_id,
            commits = commit_graph.len(),
            uploads = view.upload_count(),
            "Loaded commit graph view"
        );
        let graph = VisibilityGraph::new_cancellable(
            commit_graph,
            &view,
            cancel,
            self.cancel_check_interval,
        )?;

        let mut update = VisibilityUpdate::default();
        tx.execute_batch(SCRATCH_SCHEMA)?;
        {
            let mut insert_node = tx.prepare(
                "INSERT INTO temp.t_nearest_uploads (commit_hash, uploads) VALUES (?1, ?2)",
            )?;
            let mut insert_link = tx.prepare(
                "INSERT INTO temp.t_nearest_uploads_links (commit_hash, ancestor_commit_hash, distance)
                 VALUES (?1, ?2, ?3)",
            )?;

            for (written, envelope) in graph.stream().enumerate() {
                if written % self.cancel_check_interval == 0 && cancel.is_cancelled() {
                    debug!(repository_id = %repository_id, written, "Visibility recomputation cancelled");
                    return Err(Error::Cancelled);
                }

                match envelope {
                    Envelope::Direct { commit, uploads } => {
                        insert_node.execute(params![commit, serialize_upload_metas(&uploads)?])?;
                        update.direct_nodes += 1;
                    }
                    Envelope::Link {
                        commit,
                        ancestor,
                        distance,
                    } => {
                        insert_link.execute(params![commit, ancestor, i64::from(distance)])?;
                        update.link_nodes += 1;
                    }
                }
            }
        }

        let repo = repository_id.as_i64();
        update.nodes_updated = tx.execute(UPDATE_NODES, [repo])?;
        update.nodes_inserted = tx.execute(INSERT_NODES, [repo])?;
        update.nodes_deleted = tx.execute(DELETE_NODES, [repo])?;
        update.links_updated = tx.execute(UPDATE_LINKS, [repo])?;
        update.links_inserted = tx.execute(INSERT_LINKS, [repo])?;
        update.links_deleted = tx.execute(DELETE_LINKS, [repo])?;
        tx.execute_batch(DROP_SCRATCH_SCHEMA)?;

        if !commit_graph.contains(tip_commit) {
            warn!(
                repository_id = %repository_id,
                tip_commit,
                "Tip commit is not part of the commit graph; no uploads visible at tip"
            );
        }
        tx.execute(
            "DELETE FROM uploads_visible_at_tip WHERE repository_id = ?1",
            [repo],
        )?;
        {
            let mut insert_tip = tx.prepare(
                "INSERT INTO uploads_visible_at_tip (repository_id, upload_id) VALUES (?1, ?2)",
            )?;
            for meta in graph.uploads_visible_at_commit(tip_commit) {
                insert_tip.execute(params![repo, meta.upload_id.as_i64()])?;
                update.uploads_visible_at_tip += 1;
            }
        }

        if dirty_token != 0 {
            // A newer dirty signal may have arrived while we ran, so only ever move forward.
            tx.execute(
                "UPDATE dirty_repositories
                 SET update_token = MAX(update_token, ?1), updated_at = ?2
                 WHERE repository_id = ?3",
                params![dirty_token, now, repo],
            )?;
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tx.commit()?;

        debug!(
            repository_id = %repository_id,
            tip_commit,
            dirty_token,
            direct_nodes = update.direct_nodes,
            link_nodes = update.link_nodes,
            rows_changed = update.rows_changed(),
            uploads_visible_at_tip = update.uploads_visible_at_tip,
            "Calculated visible uploads"
        );
        Ok(update)
    }

    /// Uploads visible at `commit`, resolved through at most one link.
    ///
    /// Returns an empty list for commits with no persisted visibility data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChainedLink`] or [`Error::DanglingLink`] if the
    /// persisted graph is inconsistent, and database errors otherwise.
    pub fn visible_uploads_for_commit(
        &self,
        repository_id: RepositoryId,
        commit: &str,
    ) -> Result<Vec<UploadMeta>> {
        let conn = self.connection()?;
        visible_uploads_in(&conn, repository_id, commit)
    }

    /// Uploads visible from the tip of the default branch, in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn uploads_visible_at_tip(&self, repository_id: RepositoryId) -> Result<Vec<UploadId>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT upload_id FROM uploads_visible_at_tip
             WHERE repository_id = ?1 ORDER BY upload_id",
        )?;
        let ids = stmt
            .query_map([repository_id.as_i64()], |row| Ok(UploadId(row.get(0)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Whether visibility data exists for `commit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn has_commit(&self, repository_id: RepositoryId, commit: &str) -> Result<bool> {
        let conn = self.connection()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM nearest_uploads WHERE repository_id = ?1 AND commit_hash = ?2)
                 OR EXISTS (SELECT 1 FROM nearest_uploads_links WHERE repository_id = ?1 AND commit_hash = ?2)",
            params![repository_id.as_i64(), commit],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Completed uploads visible at `commit` whose root contains `path`.
    ///
    /// Ordered nearest first, then by upload id. These are the uploads a
    /// navigation request at `(commit, path)` should open.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`Store::visible_uploads_for_commit`].
    pub fn closest_uploads(
        &self,
        repository_id: RepositoryId,
        commit: &str,
        path: &str,
    ) -> Result<Vec<Upload>> {
        let conn = self.connection()?;
        let mut candidates: Vec<(u32, Upload)> = Vec::new();

        for meta in visible_uploads_in(&conn, repository_id, commit)? {
            // Uploads deleted or reprocessed since the last recomputation are skipped.
            let Some(upload) = upload_in(&conn, meta.upload_id)? else {
                continue;
            };
            if upload.state == UploadState::Completed && path.starts_with(upload.root.as_str()) {
                candidates.push((meta.distance, upload));
            }
        }

        candidates.sort_by_key(|(distance, upload)| (*distance, upload.id));
        Ok(candidates.into_iter().map(|(_, upload)| upload).collect())
    }
}

fn visible_uploads_in(
    conn: &Connection,
    repository_id: RepositoryId,
    commit: &str,
) -> Result<Vec<UploadMeta>> {
    let repo = repository_id.as_i64();

    if let Some(encoded) = direct_uploads(conn, repo, commit)? {
        return deserialize_upload_metas(&encoded);
    }

    let Some((ancestor, distance)) = link_for(conn, repo, commit)? else {
        return Ok(Vec::new());
    };

    if let Some(encoded) = direct_uploads(conn, repo, &ancestor)? {
        let mut uploads = deserialize_upload_metas(&encoded)?;
        for meta in &mut uploads {
            meta.distance += distance;
        }
        return Ok(uploads);
    }

    let err = if link_for(conn, repo, &ancestor)?.is_some() {
        Error::ChainedLink {
            commit: commit.to_string(),
            ancestor,
        }
    } else {
        Error::DanglingLink {
            commit: commit.to_string(),
            ancestor,
        }
    };
    error!(repository_id = %repository_id, error = %err, "Persisted visibility graph is inconsistent");
    Err(err)
}

fn direct_uploads(conn: &Connection, repo: i64, commit: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT uploads FROM nearest_uploads WHERE repository_id = ?1 AND commit_hash = ?2",
        params![repo, commit],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

fn link_for(conn: &Connection, repo: i64, commit: &str) -> Result<Option<(String, u32)>> {
    conn.query_row(
        "SELECT ancestor_commit_hash, distance FROM nearest_uploads_links
         WHERE repository_id = ?1 AND commit_hash = ?2",
        params![repo, commit],
        |row| Ok((row.get(0)?, column_distance(row, 1)?)),
    )
    .optional()
    .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewUpload;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp")
    }

    #[test]
    fn scratch_tables_do_not_outlive_the_run() {
        let store = Store::open_in_memory().unwrap();
        let repo = RepositoryId(1);
        store
            .insert_upload(&NewUpload::completed(repo, "a", "", "scip-go"))
            .unwrap();
        let graph = CommitGraph::parse("b a\na\n").unwrap();

        store
            .calculate_visible_uploads(repo, &graph, "b", 0, now(), &CancellationToken::new())
            .unwrap();

        let conn = store.connection().unwrap();
        let scratch: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_temp_master WHERE name LIKE 't_nearest_uploads%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(scratch, 0);
    }

    #[test]
    fn chained_link_is_reported_as_integrity_violation() {
        let store = Store::open_in_memory().unwrap();
        {
            let conn = store.connection().unwrap();
            conn.execute_batch(
                "INSERT INTO nearest_uploads_links VALUES (1, 'c', 'b', 1);
                 INSERT INTO nearest_uploads_links VALUES (1, 'b', 'a', 1);",
            )
            .unwrap();
        }

        let err = store
            .visible_uploads_for_commit(RepositoryId(1), "c")
            .expect_err("chained link");
        assert!(matches!(err, Error::ChainedLink { .. }));
        assert!(err.is_integrity_violation());
    }

    #[test]
    fn dangling_link_is_reported_as_integrity_violation() {
        let store = Store::open_in_memory().unwrap();
        {
            let conn = store.connection().unwrap();
            conn.execute(
                "INSERT INTO nearest_uploads_links VALUES (1, 'c', 'gone', 2)",
                [],
            )
            .unwrap();
        }

        let err = store
            .visible_uploads_for_commit(RepositoryId(1), "c")
            .expect_err("dangling link");
        assert!(matches!(err, Error::DanglingLink { ancestor, .. } if ancestor == "gone"));
    }

    #[test]
    fn already_cancelled_run_touches_nothing() {
        let store = Store::open_in_memory().unwrap();
        let repo = RepositoryId(1);
        let graph = CommitGraph::parse("a\n").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = store
            .calculate_visible_uploads(repo, &graph, "a", 0, now(), &cancel)
            .expect_err("cancelled");

        assert!(matches!(err, Error::Cancelled));
        assert!(!store.has_commit(repo, "a").unwrap());

        let conn = store.connection().unwrap();
        let scratch: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_temp_master WHERE name LIKE 't_nearest_uploads%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(scratch, 0);
    }
}
