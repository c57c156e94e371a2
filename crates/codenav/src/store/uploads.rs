//! Upload CRUD operations for the visibility store.
//!
//! Ingestion itself happens elsewhere; these operations are the minimal
//! surface needed to record which indexes exist and which are completed.

use rusqlite::{Connection, OptionalExtension, params};

use super::helpers::{UPLOADS_COLUMNS, row_to_upload};
use super::Store;
use crate::commitgraph::CommitGraphView;
use crate::error::Result;
use crate::types::{NewUpload, RepositoryId, Token, Upload, UploadId, UploadMeta, UploadState};

impl Store {
    /// Record a new upload, returning its ID.
    ///
    /// This does not mark the repository dirty; callers that add completed
    /// uploads follow up with [`Store::mark_repository_dirty`].
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_upload(&self, upload: &NewUpload) -> Result<UploadId> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO uploads (repository_id, commit_hash, root, indexer, state)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                upload.repository_id.as_i64(),
                upload.commit,
                upload.root,
                upload.indexer,
                upload.state.as_str(),
            ],
        )?;
        let id = UploadId(conn.last_insert_rowid());
        tracing::trace!(
            upload_id = %id,
            repository_id = %upload.repository_id,
            commit = %upload.commit,
            "Inserted upload"
        );
        Ok(id)
    }

    /// Change an upload's state. Returns `false` if the upload does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_upload_state(&self, id: UploadId, state: UploadState) -> Result<bool> {
        let conn = self.connection()?;
        let updated = conn.execute(
            "UPDATE uploads SET state = ?2 WHERE id = ?1",
            params![id.as_i64(), state.as_str()],
        )?;
        Ok(updated > 0)
    }

    /// Get an upload by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub fn upload(&self, id: UploadId) -> Result<Option<Upload>> {
        let conn = self.connection()?;
        upload_in(&conn, id)
    }

    /// Whether the repository has any upload that is not deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn has_repository(&self, repository_id: RepositoryId) -> Result<bool> {
        let conn = self.connection()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM uploads WHERE repository_id = ?1 AND state != 'deleted')",
            [repository_id.as_i64()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}

/// Fetch one upload using an already-locked connection.
pub(crate) fn upload_in(conn: &Connection, id: UploadId) -> Result<Option<Upload>> {
    conn.query_row(
        &format!("SELECT {UPLOADS_COLUMNS} FROM uploads WHERE id = ?1"),
        [id.as_i64()],
        row_to_upload,
    )
    .optional()
    .map_err(Into::into)
}

/// Build the view of all completed uploads for a repository.
pub(crate) fn load_commit_graph_view(
    conn: &Connection,
    repository_id: RepositoryId,
) -> Result<CommitGraphView> {
    let mut stmt = conn.prepare(
        "SELECT id, commit_hash, root, indexer FROM uploads
         WHERE repository_id = ?1 AND state = 'completed'
         ORDER BY id",
    )?;
    let rows = stmt.query_map([repository_id.as_i64()], |row| {
        Ok((
            UploadId(row.get(0)?),
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut view = CommitGraphView::new();
    for row in rows {
        let (id, commit, root, indexer) = row?;
        view.add(UploadMeta::new(id, 0), &commit, Token::new(&root, &indexer));
    }
    Ok(view)
}
