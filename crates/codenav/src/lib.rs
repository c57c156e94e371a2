//! # Codenav: Commit-Graph Visibility and Cross-Commit Mapping
//!
//! Codenav is the engine behind precise code navigation over uploaded code
//! intelligence indexes. Indexes are computed at specific commits; users browse
//! arbitrary commits. Codenav answers which indexes are usable at a commit and
//! translates their locations to that commit.
//!
//! ## Components
//!
//! - **[`Store`]** - persists, per repository, the nearest completed uploads
//!   visible from every commit as direct or link nodes, recomputed
//!   incrementally and atomically from a [`CommitGraph`].
//! - **[`CommitCache`]** - remembers whether commits exist so repeated
//!   requests skip the commit resolution service.
//! - **[`MappedIndex`] / [`MappedDocument`]** - view one upload's documents
//!   from a target commit, translating ranges through a [`RangeTranslator`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use chrono::Utc;
//! use codenav::{CommitGraph, NewUpload, RepositoryId, Store};
//! use tokio_util::sync::CancellationToken;
//!
//! let store = Store::open_in_memory()?;
//! let repo = RepositoryId(1);
//!
//! store.insert_upload(&NewUpload::completed(repo, "a", "", "scip-go"))?;
//! let dirty_token = store.mark_repository_dirty(repo)?;
//!
//! // Output of `git log --topo-order --pretty="%H %P"`
//! let graph = CommitGraph::parse("c b\nb a\na\n")?;
//! store.calculate_visible_uploads(repo, &graph, "c", dirty_token, Utc::now(), &CancellationToken::new())?;
//!
//! let visible = store.visible_uploads_for_commit(repo, "c")?;
//! assert_eq!(visible[0].distance, 2);
//! # Ok::<(), codenav::Error>(())
//! ```

mod cache;
mod collaborators;
mod commitgraph;
mod config;
mod error;
mod mapper;
mod store;
mod types;

pub use cache::CommitCache;
pub use collaborators::{CommitResolver, DocumentStore, RangeTranslator};
pub use commitgraph::{CommitGraph, CommitGraphView, Envelope, VisibilityGraph};
pub use config::{
    Config, DEFAULT_CANCEL_CHECK_INTERVAL, DEFAULT_DATABASE_PATH, DEFAULT_LOG_FILTER,
    init_logging,
};
pub use error::{Error, Result};
pub use mapper::{MappedDocument, MappedIndex};
pub use store::Store;
pub use types::{
    CommitGraphMetadata, Document, NewUpload, Occurrence, Position, Range, RepositoryCommit,
    RepositoryId, Token, Upload, UploadId, UploadMeta, UploadState, UploadSummary,
    VisibilityUpdate,
};
