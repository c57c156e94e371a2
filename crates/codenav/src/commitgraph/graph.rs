//! Nearest-upload resolution over a commit graph.
//!
//! ## Algorithm
//!
//! Commits are visited once, in topological order (parents first), so every
//! parent's visibility is final before any child looks at it.
//!
//! - A commit with exactly one parent and no uploads of its own sees exactly
//!   what its parent sees, one edge further away. It becomes a **link** to the
//!   nearest direct ancestor along that single-parent chain, which takes
//!   constant work per commit and never chains.
//! - Every other commit (roots, merges, commits carrying uploads) becomes a
//!   **direct** node. Its candidates are each parent's uploads offset by the
//!   parent's distance plus one, followed by its own uploads at distance 0.
//!
//! Per token the nearest candidate wins; at equal distance the lowest upload
//! id wins. Only direct nodes hold upload maps. Envelopes are produced lazily
//! by [`VisibilityGraph::stream`] so the persistence layer can write them as
//! they come instead of holding the decorated graph in memory.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use super::parse::CommitGraph;
use super::view::CommitGraphView;
use crate::error::{Error, Result};
use crate::types::{Token, UploadMeta};

/// Visibility decision for one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope<'a> {
    /// The commit's visible uploads, ordered by upload id.
    Direct {
        /// The commit.
        commit: &'a str,
        /// Nearest upload per token.
        uploads: Vec<UploadMeta>,
    },
    /// The commit sees exactly what `ancestor` sees, `distance` edges further away.
    Link {
        /// The commit.
        commit: &'a str,
        /// Nearest direct ancestor on the first-parent chain.
        ancestor: &'a str,
        /// Edges between `commit` and `ancestor`.
        distance: u32,
    },
}

impl Envelope<'_> {
    /// The commit this decision belongs to.
    #[must_use]
    pub fn commit(&self) -> &str {
        match self {
            Self::Direct { commit, .. } | Self::Link { commit, .. } => commit,
        }
    }
}

type UploadsByToken<'a> = HashMap<&'a Token, UploadMeta>;

/// Commit graph decorated with nearest visible uploads.
#[derive(Debug)]
pub struct VisibilityGraph<'a> {
    graph: &'a CommitGraph,
    /// Direct nodes by commit index.
    direct: HashMap<usize, UploadsByToken<'a>>,
    /// Link nodes by commit index: (direct ancestor index, distance).
    links: HashMap<usize, (usize, u32)>,
}

impl<'a> VisibilityGraph<'a> {
    /// Resolve visibility for every commit of `graph` against `view`.
    #[must_use]
    pub fn new(graph: &'a CommitGraph, view: &'a CommitGraphView) -> Self {
        let mut visibility = Self::empty(graph);
        for &idx in graph.order_indices() {
            visibility.visit(idx, view);
        }
        visibility.log_summary();
        visibility
    }

    /// Like [`VisibilityGraph::new`], checking `cancel` every `check_interval` commits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] as soon as a check observes cancellation.
    pub fn new_cancellable(
        graph: &'a CommitGraph,
        view: &'a CommitGraphView,
        cancel: &CancellationToken,
        check_interval: usize,
    ) -> Result<Self> {
        let check_interval = check_interval.max(1);
        let mut visibility = Self::empty(graph);
        for (visited, &idx) in graph.order_indices().iter().enumerate() {
            if visited % check_interval == 0 && cancel.is_cancelled() {
                tracing::debug!(visited, commits = graph.len(), "Visibility traversal cancelled");
                return Err(Error::Cancelled);
            }
            visibility.visit(idx, view);
        }
        visibility.log_summary();
        Ok(visibility)
    }

    fn empty(graph: &'a CommitGraph) -> Self {
        Self {
            graph,
            direct: HashMap::new(),
            links: HashMap::new(),
        }
    }

    /// Decide one commit. All of its parents must already be decided.
    fn visit(&mut self, idx: usize, view: &'a CommitGraphView) {
        let graph = self.graph;
        let commit = graph.commit_at(idx);
        let parents = graph.parent_indices(idx);

        if let [parent] = parents
            && !view.has_uploads(commit)
        {
            let link = self
                .links
                .get(parent)
                .map_or((*parent, 1), |&(ancestor, distance)| (ancestor, distance + 1));
            self.links.insert(idx, link);
            return;
        }

        let mut uploads = UploadsByToken::new();
        for &parent in parents {
            let (ancestor, offset) = self.links.get(&parent).copied().unwrap_or((parent, 0));
            if let Some(ancestor_uploads) = self.direct.get(&ancestor) {
                for (&token, meta) in ancestor_uploads {
                    let candidate = UploadMeta::new(meta.upload_id, meta.distance + offset + 1);
                    replace_if_closer(&mut uploads, token, candidate);
                }
            }
        }
        for meta in view.uploads_at(commit) {
            if let Some(token) = view.token(meta.upload_id) {
                replace_if_closer(&mut uploads, token, *meta);
            }
        }

        self.direct.insert(idx, uploads);
    }

    fn log_summary(&self) {
        tracing::trace!(
            commits = self.graph.len(),
            direct = self.direct.len(),
            links = self.links.len(),
            "Resolved commit graph visibility"
        );
    }

    /// Uploads visible at `commit`, ordered by upload id.
    ///
    /// Returns an empty list for commits that are not part of the graph.
    #[must_use]
    pub fn uploads_visible_at_commit(&self, commit: &str) -> Vec<UploadMeta> {
        let Some(idx) = self.graph.index_of(commit) else {
            return Vec::new();
        };
        let (ancestor, offset) = self.links.get(&idx).copied().unwrap_or((idx, 0));
        self.sorted_uploads(ancestor, offset)
    }

    /// Lazily produce one envelope per commit, in topological order.
    pub fn stream(&self) -> impl Iterator<Item = Envelope<'a>> + '_ {
        let graph = self.graph;
        graph.order_indices().iter().map(move |&idx| {
            let commit = graph.commit_at(idx);
            match self.links.get(&idx) {
                Some(&(ancestor, distance)) => Envelope::Link {
                    commit,
                    ancestor: graph.commit_at(ancestor),
                    distance,
                },
                None => Envelope::Direct {
                    commit,
                    uploads: self.sorted_uploads(idx, 0),
                },
            }
        })
    }

    /// Number of commits resolved to direct nodes.
    #[must_use]
    pub fn direct_node_count(&self) -> usize {
        self.direct.len()
    }

    /// Number of commits resolved to link nodes.
    #[must_use]
    pub fn link_node_count(&self) -> usize {
        self.links.len()
    }

    fn sorted_uploads(&self, direct_idx: usize, offset: u32) -> Vec<UploadMeta> {
        let mut uploads: Vec<UploadMeta> = self
            .direct
            .get(&direct_idx)
            .map(|by_token| {
                by_token
                    .values()
                    .map(|meta| UploadMeta::new(meta.upload_id, meta.distance + offset))
                    .collect()
            })
            .unwrap_or_default();
        uploads.sort_by_key(|meta| meta.upload_id);
        uploads
    }
}

/// Keep the nearest upload per token; at equal distance the lowest upload id wins.
fn replace_if_closer<'a>(
    uploads: &mut UploadsByToken<'a>,
    token: &'a Token,
    candidate: UploadMeta,
) {
    let keep_current = uploads.get(token).is_some_and(|current| {
        (current.distance, current.upload_id) <= (candidate.distance, candidate.upload_id)
    });
    if !keep_current {
        uploads.insert(token, candidate);
    }
}
