//! Cross-commit location mapper.
//!
//! An upload is indexed at one commit, but requests arrive for whatever commit
//! the user is looking at. A [`MappedIndex`] binds one completed upload to one
//! target commit, and the [`MappedDocument`]s it hands out report every range
//! in target-commit coordinates by asking a [`RangeTranslator`] to follow the
//! diff between the two commits.
//!
//! ## Module Structure
//!
//! - `document` - [`MappedDocument`] and its one-shot full translation
//!
//! ## Design Decisions
//!
//! | Concern | Choice |
//! |---------|--------|
//! | Full translation | Once per document, shared by all callers, errors cached |
//! | Single-range lookup | Translate only the queried range, back to the index commit |
//! | Documents | Fetched fresh on every `get_document` call, never cached here |

mod document;

pub use document::MappedDocument;

use std::sync::Arc;

use tracing::trace;

use crate::collaborators::{DocumentStore, RangeTranslator};
use crate::error::Result;
use crate::types::UploadSummary;

/// One completed upload, viewed from a target commit.
pub struct MappedIndex {
    documents: Arc<dyn DocumentStore>,
    translator: Arc<dyn RangeTranslator>,
    upload: UploadSummary,
    target_commit: String,
}

impl MappedIndex {
    /// Bind `upload` to `target_commit`.
    ///
    /// `translator` must be able to translate between the upload's commit and
    /// `target_commit` in both directions.
    #[must_use]
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        translator: Arc<dyn RangeTranslator>,
        upload: UploadSummary,
        target_commit: impl Into<String>,
    ) -> Self {
        Self {
            documents,
            translator,
            upload,
            target_commit: target_commit.into(),
        }
    }

    /// Identity of the upload behind this index.
    #[must_use]
    pub fn upload_summary(&self) -> &UploadSummary {
        &self.upload
    }

    /// Commit that all returned ranges refer to.
    #[must_use]
    pub fn target_commit(&self) -> &str {
        &self.target_commit
    }

    /// The document at a repository-relative `path`.
    ///
    /// Returns `Ok(None)` if `path` lies outside the upload root or the upload
    /// has no document there.
    ///
    /// # Errors
    ///
    /// Propagates document store failures.
    pub async fn get_document(&self, path: &str) -> Result<Option<MappedDocument>> {
        let Some(relative) = path.strip_prefix(self.upload.root.as_str()) else {
            trace!(upload_id = %self.upload.id, path, root = %self.upload.root, "Path outside upload root");
            return Ok(None);
        };

        let Some(document) = self.documents.document(self.upload.id, relative).await? else {
            return Ok(None);
        };

        Ok(Some(MappedDocument::new(
            Arc::clone(&self.translator),
            self.upload.commit.clone(),
            self.target_commit.clone(),
            path.to_string(),
            document,
        )))
    }
}
