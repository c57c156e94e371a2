//! Domain types for codenav.
//!
//! These types represent the shared data model:
//! - **Identifiers**: `RepositoryId`, `UploadId`, `Token`
//! - **Visibility**: `UploadMeta`, `CommitGraphMetadata`, `VisibilityUpdate`
//! - **Uploads**: `NewUpload`, `Upload`, `UploadSummary`, `UploadState`
//! - **Documents**: `Position`, `Range`, `Occurrence`, `Document`
//!
//! ## Design Decisions
//!
//! | Decision | Choice | Rationale |
//! |----------|--------|-----------|
//! | Ids | Newtypes over i64 | `SQLite` stores i64; newtypes stop repo/upload swaps |
//! | Distance | u32 | Edge counts are never negative |
//! | Commit | `String` | Hex hashes come from git verbatim |
//! | Token | sha256 hex of `root:indexer` | Stable across processes and runs |

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Strongly-typed ID wrappers
// ============================================================================

/// A strongly-typed repository ID to prevent mixing with upload IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepositoryId(pub i64);

impl RepositoryId {
    /// Extract the raw i64 value.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A strongly-typed upload (completed index) ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UploadId(pub i64);

impl UploadId {
    /// Extract the raw i64 value.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fingerprint of an upload's `(root, indexer)` pair.
///
/// Two uploads compete for nearest-visibility on the same commit iff they
/// share a token.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Token(String);

impl Token {
    /// Derive the token for an upload root and indexer name.
    #[must_use]
    pub fn new(root: &str, indexer: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(root.as_bytes());
        hasher.update(b":");
        hasher.update(indexer.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// The hex representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Visibility
// ============================================================================

/// One completed upload visible from a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadMeta {
    /// The visible upload.
    pub upload_id: UploadId,
    /// Graph edges between the commit and the upload's own commit (0 = exact match).
    pub distance: u32,
}

impl UploadMeta {
    /// Create upload metadata.
    #[must_use]
    pub fn new(upload_id: UploadId, distance: u32) -> Self {
        Self {
            upload_id,
            distance,
        }
    }
}

/// A `(repository, commit)` pair, as sent to the commit resolution service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryCommit {
    /// Repository the commit belongs to.
    pub repository_id: RepositoryId,
    /// Full commit hash.
    pub commit: String,
}

impl RepositoryCommit {
    /// Create a repository commit pair.
    #[must_use]
    pub fn new(repository_id: RepositoryId, commit: impl Into<String>) -> Self {
        Self {
            repository_id,
            commit: commit.into(),
        }
    }
}

/// Staleness of a repository's persisted visibility data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommitGraphMetadata {
    /// `true` when the dirty and update tokens differ.
    pub stale: bool,
    /// When visibility was last successfully recomputed, if ever.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Statistics about a single visibility recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VisibilityUpdate {
    /// Direct nodes emitted by the traversal.
    pub direct_nodes: usize,
    /// Link nodes emitted by the traversal.
    pub link_nodes: usize,
    /// Persisted direct rows whose upload list changed.
    pub nodes_updated: usize,
    /// Direct rows written for the first time.
    pub nodes_inserted: usize,
    /// Direct rows removed because the commit is no longer a direct node.
    pub nodes_deleted: usize,
    /// Persisted link rows whose ancestor or distance changed.
    pub links_updated: usize,
    /// Link rows written for the first time.
    pub links_inserted: usize,
    /// Link rows removed because the commit is no longer a link node.
    pub links_deleted: usize,
    /// Uploads visible from the tip commit.
    pub uploads_visible_at_tip: usize,
}

impl VisibilityUpdate {
    /// Total persisted rows touched by the diff.
    #[must_use]
    pub fn rows_changed(&self) -> usize {
        self.nodes_updated
            + self.nodes_inserted
            + self.nodes_deleted
            + self.links_updated
            + self.links_inserted
            + self.links_deleted
    }
}

// ============================================================================
// Uploads
// ============================================================================

/// Processing state of an upload.
///
/// Only [`UploadState::Completed`] uploads participate in visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Waiting to be processed
    Queued,
    /// Being converted
    Processing,
    /// Queryable
    Completed,
    /// Processing failed
    Errored,
    /// Soft-deleted
    Deleted,
}

impl UploadState {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Errored => "errored",
            Self::Deleted => "deleted",
        }
    }
}

/// Data required to record a new upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUpload {
    /// Owning repository.
    pub repository_id: RepositoryId,
    /// Commit the index was computed at.
    pub commit: String,
    /// Directory the index covers, relative to the repository root (`""` or ending in `/`).
    pub root: String,
    /// Name of the indexer that produced the upload.
    pub indexer: String,
    /// Initial state.
    pub state: UploadState,
}

impl NewUpload {
    /// A completed upload, the common case in tests and backfills.
    #[must_use]
    pub fn completed(
        repository_id: RepositoryId,
        commit: impl Into<String>,
        root: impl Into<String>,
        indexer: impl Into<String>,
    ) -> Self {
        Self {
            repository_id,
            commit: commit.into(),
            root: root.into(),
            indexer: indexer.into(),
            state: UploadState::Completed,
        }
    }
}

/// A stored upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    /// Database ID.
    pub id: UploadId,
    /// Owning repository.
    pub repository_id: RepositoryId,
    /// Commit the index was computed at.
    pub commit: String,
    /// Directory the index covers.
    pub root: String,
    /// Indexer name.
    pub indexer: String,
    /// Current state.
    pub state: UploadState,
}

impl Upload {
    /// Comparability token of this upload.
    #[must_use]
    pub fn token(&self) -> Token {
        Token::new(&self.root, &self.indexer)
    }

    /// The subset of fields a mapped index needs.
    #[must_use]
    pub fn summary(&self) -> UploadSummary {
        UploadSummary {
            id: self.id,
            root: self.root.clone(),
            commit: self.commit.clone(),
        }
    }
}

/// Identity of the upload behind a mapped index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadSummary {
    /// Upload ID.
    pub id: UploadId,
    /// Directory the index covers.
    pub root: String,
    /// Commit the index was computed at.
    pub commit: String,
}

// ============================================================================
// Documents
// ============================================================================

/// A zero-based line/character position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Zero-based line.
    pub line: u32,
    /// Zero-based character offset within the line.
    pub character: u32,
}

impl Position {
    /// Create a position.
    #[must_use]
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open source range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Range {
    /// Inclusive start.
    pub start: Position,
    /// Exclusive end.
    pub end: Position,
}

impl Range {
    /// Create a range from raw coordinates.
    #[must_use]
    pub fn new(start_line: u32, start_character: u32, end_line: u32, end_character: u32) -> Self {
        Self {
            start: Position::new(start_line, start_character),
            end: Position::new(end_line, end_character),
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{}-{}:{})",
            self.start.line, self.start.character, self.end.line, self.end.character
        )
    }
}

/// One symbol occurrence inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occurrence {
    /// Where the occurrence is.
    pub range: Range,
    /// Symbol identifier (SCIP symbol string).
    pub symbol: String,
    /// Bitset of roles (definition, reference, ...).
    pub symbol_roles: i32,
}

impl Occurrence {
    /// Copy of this occurrence at a different range.
    #[must_use]
    pub fn with_range(&self, range: Range) -> Self {
        Self {
            range,
            symbol: self.symbol.clone(),
            symbol_roles: self.symbol_roles,
        }
    }
}

/// A decoded symbol-occurrence document, in index-commit coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Document {
    /// Path relative to the upload root.
    pub relative_path: String,
    /// Occurrences as indexed.
    pub occurrences: Vec<Occurrence>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_depends_on_root_and_indexer() {
        let a = Token::new("lib/", "scip-go");
        let b = Token::new("lib/", "scip-go");
        let c = Token::new("lib/", "scip-typescript");
        let d = Token::new("cmd/", "scip-go");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn token_separator_prevents_ambiguous_pairs() {
        assert_ne!(Token::new("a", "bc"), Token::new("ab", "c"));
    }

    #[test]
    fn ranges_order_by_start_then_end() {
        let mut ranges = vec![
            Range::new(2, 0, 2, 4),
            Range::new(1, 5, 1, 9),
            Range::new(1, 5, 1, 7),
        ];
        ranges.sort();

        assert_eq!(
            ranges,
            vec![
                Range::new(1, 5, 1, 7),
                Range::new(1, 5, 1, 9),
                Range::new(2, 0, 2, 4),
            ]
        );
    }

    #[test]
    fn visibility_update_sums_changed_rows() {
        let update = VisibilityUpdate {
            nodes_inserted: 2,
            links_deleted: 3,
            direct_nodes: 10,
            ..VisibilityUpdate::default()
        };

        assert_eq!(update.rows_changed(), 5);
    }

    #[test]
    fn upload_state_round_trips_through_serde_names() {
        let json = serde_json::to_string(&UploadState::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        assert_eq!(UploadState::Completed.as_str(), "completed");
    }
}
