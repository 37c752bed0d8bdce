//! Import log models: the durable summary that outlives a committed batch.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use sokoni_core::types::{DbId, Timestamp};

/// Terminal summary of a committed import batch.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImportLog {
    pub id: DbId,
    pub file_name: String,
    pub entity_kind: String,
    pub total_rows: i32,
    pub success_rows: i32,
    pub failed_rows: i32,
    pub committed_by: Option<DbId>,
    pub created_at: Timestamp,
}

/// DTO for inserting a new import log row.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateImportLog {
    pub file_name: String,
    pub entity_kind: String,
    pub total_rows: i32,
    pub success_rows: i32,
    pub failed_rows: i32,
    pub committed_by: Option<DbId>,
}
