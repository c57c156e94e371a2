//! Commit graph input and nearest-upload resolution.
//!
//! ## Module Structure
//!
//! - `parse` - Raw commit DAG ([`CommitGraph`]) with a topological order
//! - `view` - Completed uploads of a repository ([`CommitGraphView`])
//! - `graph` - Traversal producing direct/link decisions ([`VisibilityGraph`])
//!
//! The store builds a view from its `uploads` table, resolves a
//! [`VisibilityGraph`], and consumes [`VisibilityGraph::stream`] while writing.

mod graph;
mod parse;
mod view;

pub use graph::{Envelope, VisibilityGraph};
pub use parse::CommitGraph;
pub use view::CommitGraphView;
