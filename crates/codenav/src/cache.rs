//! Commit existence cache.
//!
//! Remembers, per repository, whether a commit exists, so navigation requests
//! do not ask the commit resolution service about the same commit twice.
//! Commit existence never changes once established, so entries are never
//! invalidated and the cache lives as long as its owner.
//!
//! ## Locking
//!
//! | Step | Lock |
//! |------|------|
//! | Partition input into known and unknown pairs | shared (read) |
//! | Batched resolver call for the unknown pairs | none |
//! | Write answers back | exclusive (write) |
//!
//! Two callers missing on the same pair at the same time both ask the
//! resolver. Writes are idempotent, so the only cost is a duplicate lookup.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, trace};

use crate::collaborators::CommitResolver;
use crate::error::{Error, Result};
use crate::types::{RepositoryCommit, RepositoryId};

/// Per-process cache of commit existence answers.
///
/// Construct one per composed service and share it behind an `Arc`.
pub struct CommitCache {
    resolver: Arc<dyn CommitResolver>,
    cache: RwLock<HashMap<RepositoryId, HashMap<String, bool>>>,
}

impl CommitCache {
    /// Create an empty cache backed by `resolver`.
    #[must_use]
    pub fn new(resolver: Arc<dyn CommitResolver>) -> Self {
        Self {
            resolver,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Whether each commit exists, parallel to `commits`.
    ///
    /// Cached pairs are answered locally; all remaining distinct pairs go to
    /// the resolver in one batch. Duplicate pairs in the input get the same
    /// answer.
    ///
    /// # Errors
    ///
    /// Propagates resolver failures, and returns
    /// [`Error::ResolverLengthMismatch`] if the resolver answers with the
    /// wrong number of results. Nothing is cached in either case.
    pub async fn are_resolvable(&self, commits: &[RepositoryCommit]) -> Result<Vec<bool>> {
        let mut answers: Vec<Option<bool>> = Vec::with_capacity(commits.len());
        let mut unknown: Vec<RepositoryCommit> = Vec::new();
        {
            let cache = self.cache.read().await;
            let mut seen: HashSet<&RepositoryCommit> = HashSet::new();
            for pair in commits {
                let known = cache
                    .get(&pair.repository_id)
                    .and_then(|by_commit| by_commit.get(&pair.commit))
                    .copied();
                if known.is_none() && seen.insert(pair) {
                    unknown.push(pair.clone());
                }
                answers.push(known);
            }
        }

        if unknown.is_empty() {
            trace!(pairs = commits.len(), "All commits answered from cache");
            return Ok(answers.into_iter().map(|a| a.unwrap_or_default()).collect());
        }

        let resolved = self.resolver.commits_exist(&unknown).await?;
        if resolved.len() != unknown.len() {
            let err = Error::ResolverLengthMismatch {
                expected: unknown.len(),
                actual: resolved.len(),
            };
            error!(error = %err, "Commit resolver broke its contract");
            return Err(err);
        }
        debug!(
            pairs = commits.len(),
            resolved = unknown.len(),
            "Resolved uncached commits"
        );

        let resolved: HashMap<RepositoryCommit, bool> = unknown.into_iter().zip(resolved).collect();
        {
            let mut cache = self.cache.write().await;
            for (pair, exists) in &resolved {
                cache
                    .entry(pair.repository_id)
                    .or_default()
                    .insert(pair.commit.clone(), *exists);
            }
        }

        Ok(commits
            .iter()
            .zip(answers)
            .map(|(pair, known)| known.or_else(|| resolved.get(pair).copied()).unwrap_or_default())
            .collect())
    }

    /// Record that a commit exists without asking the resolver.
    ///
    /// Used when existence is already established, for example for the
    /// commit of a freshly processed upload.
    pub async fn mark_resolvable(&self, repository_id: RepositoryId, commit: &str) {
        self.cache
            .write()
            .await
            .entry(repository_id)
            .or_default()
            .insert(commit.to_string(), true);
    }
}
