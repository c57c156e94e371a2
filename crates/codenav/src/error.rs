//! Error types for codenav operations.
//!
//! All three engine components propagate errors to their immediate caller.
//! Retry and backoff belong to whoever schedules the work (for example by
//! re-enqueueing a dirty repository), so nothing here is retried locally.
//!
//! ## Error Categorization
//!
//! - **Infrastructure** (database, I/O, collaborator failures): transient,
//!   surfaced as-is.
//! - **Integrity violations** (resolver length mismatch, chained or dangling
//!   links): defects that indicate the nearest-upload invariant may already be
//!   broken upstream. See [`Error::is_integrity_violation`].
//! - **Expected absence** (no document at a path, a range deleted at the
//!   target commit) is never an error; those operations return `None` or an
//!   empty result instead.

use std::sync::Arc;

use thiserror::Error;

/// Result type for codenav operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for codenav operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted JSON could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration or arguments
    #[error("configuration error: {0}")]
    Config(String),

    /// The raw commit graph could not be parsed or is not a DAG
    #[error("invalid commit graph: {0}")]
    CommitGraph(String),

    /// The commit resolution service returned a result slice of the wrong size
    #[error(
        "commit resolver returned {actual} results for {expected} commits; \
         a resolver implementation or test double is broken"
    )]
    ResolverLengthMismatch {
        /// Number of commits sent to the resolver
        expected: usize,
        /// Number of answers received
        actual: usize,
    },

    /// A persisted link node points at another link node
    #[error("commit {commit} links to {ancestor}, which is itself a link")]
    ChainedLink {
        /// The linked commit
        commit: String,
        /// The ancestor it links to
        ancestor: String,
    },

    /// A persisted link node points at a commit with no visibility row
    #[error("commit {commit} links to {ancestor}, which has no visibility data")]
    DanglingLink {
        /// The linked commit
        commit: String,
        /// The missing ancestor
        ancestor: String,
    },

    /// An external collaborator (document store, range translator, resolver) failed
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// A document's full range translation failed earlier; every caller sees the same failure
    #[error("document mapping failed: {0}")]
    Mapping(Arc<Error>),

    /// The request scope was cancelled before the operation finished
    #[error("operation cancelled")]
    Cancelled,

    /// Internal invariant broken (poisoned lock, serialization of owned data)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns `true` for defects that signal corrupted or inconsistent data.
    ///
    /// These are fatal to the current operation and must never be masked by
    /// dropping data.
    #[must_use]
    pub fn is_integrity_violation(&self) -> bool {
        match self {
            Self::ResolverLengthMismatch { .. }
            | Self::ChainedLink { .. }
            | Self::DanglingLink { .. } => true,
            Self::Mapping(inner) => inner.is_integrity_violation(),
            _ => false,
        }
    }

    /// Create a collaborator error from any displayable failure.
    #[must_use]
    pub fn collaborator(message: impl Into<String>) -> Self {
        Self::Collaborator(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_violations_are_classified() {
        assert!(
            Error::ResolverLengthMismatch {
                expected: 2,
                actual: 1
            }
            .is_integrity_violation()
        );
        assert!(
            Error::ChainedLink {
                commit: "b".to_string(),
                ancestor: "a".to_string()
            }
            .is_integrity_violation()
        );
        assert!(!Error::Cancelled.is_integrity_violation());
        assert!(!Error::collaborator("timeout").is_integrity_violation());
    }

    #[test]
    fn mapping_error_wraps_and_displays_cause() {
        let err = Error::Mapping(Arc::new(Error::collaborator("gitserver unavailable")));

        let display = err.to_string();
        assert!(display.contains("document mapping failed"));
        assert!(display.contains("gitserver unavailable"));
        assert!(!err.is_integrity_violation());
    }

    #[test]
    fn resolver_mismatch_reports_both_lengths() {
        let display = Error::ResolverLengthMismatch {
            expected: 3,
            actual: 1,
        }
        .to_string();

        assert!(display.contains('3'));
        assert!(display.contains('1'));
    }
}
