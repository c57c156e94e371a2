//! A single document viewed from the target commit.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, trace, warn};

use crate::collaborators::RangeTranslator;
use crate::error::{Error, Result};
use crate::types::{Document, Occurrence, Range};

type MapOutcome = std::result::Result<Arc<[Occurrence]>, Arc<Error>>;

/// A document of one upload whose ranges are reported at the target commit.
///
/// Every method accepts and returns target-commit coordinates. The full
/// translation of all occurrences runs at most once per instance: concurrent
/// first callers wait for the same pass, and its outcome (occurrences or
/// error) is kept for every later call. If the task running the pass is
/// cancelled, one of the waiting callers starts it again.
pub struct MappedDocument {
    translator: Arc<dyn RangeTranslator>,
    index_commit: String,
    target_commit: String,
    path: String,
    document: Document,
    mapped: OnceCell<MapOutcome>,
}

impl MappedDocument {
    pub(crate) fn new(
        translator: Arc<dyn RangeTranslator>,
        index_commit: String,
        target_commit: String,
        path: String,
        document: Document,
    ) -> Self {
        Self {
            translator,
            index_commit,
            target_commit,
            path,
            document,
            mapped: OnceCell::new(),
        }
    }

    /// Repository-relative path of the document.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the full translation pass has finished, successfully or not.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.mapped.initialized()
    }

    /// All occurrences that still exist at the target commit.
    ///
    /// Occurrences whose range was deleted or changed beyond recognition are
    /// dropped. The returned slice is shared; repeated calls return the same
    /// allocation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mapping`] wrapping the translator failure. The failure
    /// is cached, so every later call returns it as well.
    pub async fn get_occurrences(&self) -> Result<Arc<[Occurrence]>> {
        match self.mapped.get_or_init(|| self.map_all_occurrences()).await {
            Ok(occurrences) => Ok(Arc::clone(occurrences)),
            Err(err) => Err(Error::Mapping(Arc::clone(err))),
        }
    }

    /// Occurrences whose range equals `range` at the target commit.
    ///
    /// If the full pass has finished its result is searched directly.
    /// Otherwise only `range` is translated back to the index commit, so a
    /// single lookup never pays for the whole document.
    ///
    /// # Errors
    ///
    /// Returns the cached [`Error::Mapping`] if the full pass failed, or the
    /// translator's error for the single-range lookup. A failed single-range
    /// lookup is not cached.
    pub async fn get_occurrences_at_range(&self, range: Range) -> Result<Vec<Occurrence>> {
        if let Some(outcome) = self.mapped.get() {
            return match outcome {
                Ok(occurrences) => Ok(occurrences
                    .iter()
                    .filter(|occurrence| occurrence.range == range)
                    .cloned()
                    .collect()),
                Err(err) => Err(Error::Mapping(Arc::clone(err))),
            };
        }

        let Some(index_range) = self
            .translator
            .translate_range(&self.target_commit, &self.index_commit, &self.path, range, false)
            .await?
        else {
            trace!(path = %self.path, %range, "Range does not exist at the index commit");
            return Ok(Vec::new());
        };

        Ok(self
            .document
            .occurrences
            .iter()
            .filter(|occurrence| occurrence.range == index_range)
            .map(|occurrence| occurrence.with_range(range))
            .collect())
    }

    async fn map_all_occurrences(&self) -> MapOutcome {
        let total = self.document.occurrences.len();
        let mut mapped = Vec::with_capacity(total);

        for occurrence in &self.document.occurrences {
            let translated = self
                .translator
                .translate_range(
                    &self.index_commit,
                    &self.target_commit,
                    &self.path,
                    occurrence.range,
                    true,
                )
                .await;

            match translated {
                Ok(Some(range)) => mapped.push(occurrence.with_range(range)),
                Ok(None) => {
                    trace!(path = %self.path, range = %occurrence.range, "Occurrence dropped at target commit");
                }
                Err(err) => {
                    warn!(
                        path = %self.path,
                        index_commit = %self.index_commit,
                        target_commit = %self.target_commit,
                        error = %err,
                        "Failed to map document occurrences"
                    );
                    return Err(Arc::new(err));
                }
            }
        }

        debug!(
            path = %self.path,
            occurrences = total,
            kept = mapped.len(),
            "Mapped document occurrences"
        );
        Ok(mapped.into())
    }
}

impl std::fmt::Debug for MappedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedDocument")
            .field("path", &self.path)
            .field("index_commit", &self.index_commit)
            .field("target_commit", &self.target_commit)
            .field("occurrences", &self.document.occurrences.len())
            .field("mapped", &self.is_mapped())
            .finish_non_exhaustive()
    }
}
