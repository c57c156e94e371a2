//! Snapshot of the completed uploads of one repository.

use std::collections::HashMap;

use crate::types::{Token, UploadId, UploadMeta};

/// Completed uploads of a repository, as seen at the start of a computation.
///
/// Built once per run and never mutated during traversal.
#[derive(Debug, Clone, Default)]
pub struct CommitGraphView {
    /// Candidate uploads defined directly on each commit (distance 0).
    pub meta: HashMap<String, Vec<UploadMeta>>,
    /// Comparability token of each upload.
    pub tokens: HashMap<UploadId, Token>,
}

impl CommitGraphView {
    /// Create an empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an upload defined at `commit`.
    pub fn add(&mut self, meta: UploadMeta, commit: &str, token: Token) {
        self.tokens.insert(meta.upload_id, token);
        self.meta.entry(commit.to_string()).or_default().push(meta);
    }

    /// Uploads defined directly at `commit`.
    #[must_use]
    pub fn uploads_at(&self, commit: &str) -> &[UploadMeta] {
        self.meta.get(commit).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether any upload is defined at `commit`.
    #[must_use]
    pub fn has_uploads(&self, commit: &str) -> bool {
        self.meta.contains_key(commit)
    }

    /// Token of an upload registered in this view.
    #[must_use]
    pub fn token(&self, upload_id: UploadId) -> Option<&Token> {
        self.tokens.get(&upload_id)
    }

    /// Number of registered uploads.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_groups_uploads_by_commit() {
        let mut view = CommitGraphView::new();
        let token = Token::new("", "scip-go");
        view.add(UploadMeta::new(UploadId(1), 0), "a", token.clone());
        view.add(UploadMeta::new(UploadId(2), 0), "a", Token::new("web/", "scip-ts"));
        view.add(UploadMeta::new(UploadId(3), 0), "b", token.clone());

        assert_eq!(view.uploads_at("a").len(), 2);
        assert_eq!(view.uploads_at("b").len(), 1);
        assert!(view.uploads_at("c").is_empty());
        assert!(!view.has_uploads("c"));
        assert_eq!(view.token(UploadId(3)), Some(&token));
        assert_eq!(view.upload_count(), 3);
    }
}
