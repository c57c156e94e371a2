//! Traits for the services the engine consumes but does not implement.
//!
//! Each trait is object-safe and `Send + Sync` so a composed service can hold
//! `Arc<dyn Trait>` handles and share them across request tasks. All calls may
//! block on network or disk, so they are async.
//!
//! Implementations report failures as [`Error::Collaborator`](crate::Error::Collaborator)
//! (or any other variant that fits); expected absence is `Ok(None)`.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Document, Range, RepositoryCommit, UploadId};

/// Source of previously decoded symbol-occurrence documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the document at `path` (relative to the upload root).
    ///
    /// Returns `Ok(None)` if the upload has no document at that path.
    async fn document(&self, upload_id: UploadId, path: &str) -> Result<Option<Document>>;
}

/// Translates source ranges between two commits using their diff.
#[async_trait]
pub trait RangeTranslator: Send + Sync {
    /// Translate `range` in `path` from `from_commit` to `to_commit`.
    ///
    /// `strict` asks the translator to give up on ambiguous hunks instead of
    /// guessing. Returns `Ok(None)` if the range no longer exists on the
    /// other side.
    async fn translate_range(
        &self,
        from_commit: &str,
        to_commit: &str,
        path: &str,
        range: Range,
        strict: bool,
    ) -> Result<Option<Range>>;
}

/// Batched lookup of whether commits exist in their repositories.
#[async_trait]
pub trait CommitResolver: Send + Sync {
    /// Answer existence for each pair, in input order.
    ///
    /// The result must have exactly one entry per input pair.
    async fn commits_exist(&self, commits: &[RepositoryCommit]) -> Result<Vec<bool>>;
}
