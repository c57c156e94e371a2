//! Raw commit graph input.
//!
//! A [`CommitGraph`] is the full parent/child DAG of a repository as handed to
//! us by source control. The usual source is
//! `git log --all --topo-order --pretty="%H %P"`, which prints one commit per
//! line followed by its parents, newest first.

use std::collections::HashMap;

use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{Error, Result};

/// A repository's commit DAG with a precomputed topological order.
///
/// Commits are stored once and referred to by dense indices internally. Parents
/// that do not appear as commits themselves (truncated history) are dropped,
/// so the commits that referenced them act as roots.
#[derive(Debug, Clone, Default)]
pub struct CommitGraph {
    commits: Vec<String>,
    index: HashMap<String, usize>,
    parents: Vec<Vec<usize>>,
    /// Parents before children.
    order: Vec<usize>,
}

impl CommitGraph {
    /// Parse `git log --topo-order --pretty="%H %P"` output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommitGraph`] if a commit is listed twice or the parent
    /// relation contains a cycle.
    pub fn parse(output: &str) -> Result<Self> {
        let entries = output.lines().filter_map(|line| {
            let mut fields = line.split_whitespace();
            let commit = fields.next()?;
            Some((commit.to_string(), fields.map(str::to_string).collect::<Vec<String>>()))
        });
        Self::from_parents(entries)
    }

    /// Build a graph from `(commit, parents)` pairs in any order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommitGraph`] if a commit is listed twice or the parent
    /// relation contains a cycle.
    pub fn from_parents<I, P>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, P)>,
        P: IntoIterator<Item = String>,
    {
        let mut commits = Vec::new();
        let mut raw_parents: Vec<Vec<String>> = Vec::new();
        let mut index = HashMap::new();

        for (commit, parents) in entries {
            if index.contains_key(&commit) {
                return Err(Error::CommitGraph(format!("commit {commit} listed twice")));
            }
            index.insert(commit.clone(), commits.len());
            commits.push(commit);
            raw_parents.push(parents.into_iter().collect());
        }

        let mut dropped = 0usize;
        let parents: Vec<Vec<usize>> = raw_parents
            .iter()
            .map(|names| {
                let mut resolved: Vec<usize> = Vec::with_capacity(names.len());
                for name in names {
                    match index.get(name) {
                        Some(&parent) if !resolved.contains(&parent) => resolved.push(parent),
                        Some(_) => {}
                        None => dropped += 1,
                    }
                }
                resolved
            })
            .collect();

        if dropped > 0 {
            tracing::debug!(
                dropped,
                commits = commits.len(),
                "Commit graph references parents outside the input; treating children as roots"
            );
        }

        let order = topological_order(&commits, &parents)?;

        Ok(Self {
            commits,
            index,
            parents,
            order,
        })
    }

    /// Number of commits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    /// Whether the graph has no commits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// Whether `commit` is part of the graph.
    #[must_use]
    pub fn contains(&self, commit: &str) -> bool {
        self.index.contains_key(commit)
    }

    /// Parents of `commit`, first parent first. `None` if the commit is unknown.
    #[must_use]
    pub fn parents(&self, commit: &str) -> Option<Vec<&str>> {
        let &idx = self.index.get(commit)?;
        Some(
            self.parents[idx]
                .iter()
                .map(|&p| self.commits[p].as_str())
                .collect(),
        )
    }

    /// Commits in topological order, parents before children.
    pub fn order(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(|&idx| self.commits[idx].as_str())
    }

    // === Index-based access for traversal ===

    pub(crate) fn index_of(&self, commit: &str) -> Option<usize> {
        self.index.get(commit).copied()
    }

    pub(crate) fn commit_at(&self, idx: usize) -> &str {
        &self.commits[idx]
    }

    pub(crate) fn parent_indices(&self, idx: usize) -> &[usize] {
        &self.parents[idx]
    }

    pub(crate) fn order_indices(&self) -> &[usize] {
        &self.order
    }
}

/// Topologically sort commits so every parent precedes its children.
fn topological_order(commits: &[String], parents: &[Vec<usize>]) -> Result<Vec<usize>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(commits.len(), commits.len());
    let nodes: Vec<NodeIndex> = (0..commits.len()).map(|idx| graph.add_node(idx)).collect();

    for (child, child_parents) in parents.iter().enumerate() {
        for &parent in child_parents {
            graph.add_edge(nodes[parent], nodes[child], ());
        }
    }

    algo::toposort(&graph, None)
        .map(|sorted| sorted.into_iter().map(|node| graph[node]).collect())
        .map_err(|cycle| {
            let commit = &commits[graph[cycle.node_id()]];
            Error::CommitGraph(format!("cycle detected at commit {commit}"))
        })
}
