//! Pending edit models: a proposed change to one live entity awaiting a
//! moderator decision.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use sokoni_core::types::{DbId, Timestamp};

/// A proposed change to one canonical entity.
///
/// `deltas` is the field-delta list computed at submission time and cached
/// for display and apply; approval writes these absolute values even if the
/// canonical entity drifted in the meantime (last-writer-wins, by design).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PendingEdit {
    pub id: DbId,
    pub entity_kind: String,
    pub entity_id: DbId,
    pub proposed: Value,
    pub deltas: Value,
    pub status: String,
    pub requested_by: DbId,
    pub requested_at: Timestamp,
    pub reviewed_by: Option<DbId>,
    pub reviewed_at: Option<Timestamp>,
    pub admin_notes: Option<String>,
    pub reject_reason: Option<String>,
    pub failure_reason: Option<String>,
}

/// DTO for inserting a new pending edit.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPendingEdit {
    pub entity_kind: String,
    pub entity_id: DbId,
    pub proposed: Value,
    pub deltas: Value,
    pub requested_by: DbId,
}

/// A pending edit joined with the canonical entity it targets, for the
/// moderator queue's side-by-side diff rendering.
#[derive(Debug, Clone, Serialize)]
pub struct PendingEditWithEntity {
    pub edit: PendingEdit,
    /// Snapshot of the canonical entity, keyed by schema field names.
    pub entity: Value,
    pub has_pending_changes: bool,
}

/// Outcome of a moderation decision on a pending edit.
#[derive(Debug)]
pub enum DecisionOutcome {
    /// The decision was applied now; the updated edit is returned.
    Applied(PendingEdit),
    /// The edit was already terminal; the stored row is returned unchanged
    /// and no writes were executed.
    AlreadyDecided(PendingEdit),
    /// Applying the cached deltas failed; the canonical entity is untouched
    /// and the edit remains pending with the reason recorded.
    ApplyFailed { edit: PendingEdit, reason: String },
}
