//! Staged import batch models.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use sokoni_core::types::{DbId, Timestamp};

/// Batch status: awaiting commit.
pub const BATCH_STATUS_PREVIEW: &str = "preview";

/// Batch status: committed to the canonical store.
pub const BATCH_STATUS_COMMITTED: &str = "committed";

/// An in-flight, not-yet-committed collection of imported rows.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StagedBatch {
    pub id: DbId,
    pub source_file_name: String,
    pub entity_kind: String,
    pub status: String,
    pub total_rows: i32,
    pub valid_rows: i32,
    pub invalid_rows: i32,
    pub duplicate_rows: i32,
    pub empty_rows: i32,
    pub warnings: Value,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub committed_at: Option<Timestamp>,
}

/// One persisted row of a staged batch with its classification.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StagedRowRecord {
    pub id: DbId,
    pub batch_id: DbId,
    pub row_number: i32,
    pub raw: Value,
    pub normalized: Value,
    pub status: String,
    pub also_duplicate: bool,
    pub errors: Value,
}

/// Options controlling a batch commit.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CommitOptions {
    /// Wipe the canonical set of this entity kind before inserting.
    /// Destructive; the HTTP layer demands an explicit confirmation flag.
    #[serde(default)]
    pub delete_existing: bool,
    /// Silently skip rows whose dedupe key now exists canonically instead
    /// of failing the whole commit.
    #[serde(default)]
    pub merge_mode: bool,
}

/// Result counters for a committed batch.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CommitResult {
    pub success_rows: i32,
    pub failed_rows: i32,
}

/// Outcome of a commit attempt on a staged batch.
#[derive(Debug)]
pub enum CommitOutcome {
    /// The batch was committed; counters describe what happened.
    Committed(CommitResult),
    /// The batch was committed earlier; committing again is rejected.
    AlreadyCommitted,
    /// A row's dedupe key exists canonically and merge mode was off; the
    /// whole commit was rolled back.
    Collision(String),
}
