//! Database schema definition for the visibility store.

/// Database schema definition.
pub(crate) const SCHEMA: &str = r"
-- Uploaded indexes; only completed rows participate in visibility
CREATE TABLE IF NOT EXISTS uploads (
    id INTEGER PRIMARY KEY,
    repository_id INTEGER NOT NULL,
    commit_hash TEXT NOT NULL,
    root TEXT NOT NULL,
    indexer TEXT NOT NULL,
    state TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_uploads_repository_state ON uploads(repository_id, state);

-- Direct nodes: explicit visible uploads per commit
-- uploads is a JSON object mapping upload id to distance, keys ascending
CREATE TABLE IF NOT EXISTS nearest_uploads (
    repository_id INTEGER NOT NULL,
    commit_hash TEXT NOT NULL,
    uploads TEXT NOT NULL,
    PRIMARY KEY (repository_id, commit_hash)
);

-- Link nodes: visibility equals the ancestor's, offset by distance
CREATE TABLE IF NOT EXISTS nearest_uploads_links (
    repository_id INTEGER NOT NULL,
    commit_hash TEXT NOT NULL,
    ancestor_commit_hash TEXT NOT NULL,
    distance INTEGER NOT NULL,
    PRIMARY KEY (repository_id, commit_hash)
);

-- Uploads visible from the tip of the default branch
CREATE TABLE IF NOT EXISTS uploads_visible_at_tip (
    repository_id INTEGER NOT NULL,
    upload_id INTEGER NOT NULL,
    PRIMARY KEY (repository_id, upload_id)
);

-- Dirty/update token pair; a repository is stale while the tokens differ
CREATE TABLE IF NOT EXISTS dirty_repositories (
    repository_id INTEGER PRIMARY KEY,
    dirty_token INTEGER NOT NULL,
    update_token INTEGER NOT NULL,
    updated_at TEXT
);
";

/// Per-run scratch tables holding the freshly computed decorated graph.
///
/// Created inside the recomputation transaction and dropped before commit, so
/// a rollback removes them too.
pub(crate) const SCRATCH_SCHEMA: &str = r"
DROP TABLE IF EXISTS temp.t_nearest_uploads;
DROP TABLE IF EXISTS temp.t_nearest_uploads_links;
CREATE TEMP TABLE t_nearest_uploads (
    commit_hash TEXT PRIMARY KEY,
    uploads TEXT NOT NULL
);
CREATE TEMP TABLE t_nearest_uploads_links (
    commit_hash TEXT PRIMARY KEY,
    ancestor_commit_hash TEXT NOT NULL,
    distance INTEGER NOT NULL
);
";

/// Drops the scratch tables.
pub(crate) const DROP_SCRATCH_SCHEMA: &str = r"
DROP TABLE IF EXISTS temp.t_nearest_uploads;
DROP TABLE IF EXISTS temp.t_nearest_uploads_links;
";
