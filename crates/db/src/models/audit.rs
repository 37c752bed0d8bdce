//! Audit log entity models and DTOs.
//!
//! Models for the append-only audit trail. Audit entries have no
//! `updated_at` field (immutable records) and carry a SHA-256 integrity
//! hash chained from the previous entry.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use sokoni_core::types::{DbId, Timestamp};

/// A single audit log entry. Immutable once created.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditEvent {
    pub id: DbId,
    pub actor_id: Option<DbId>,
    pub action_type: String,
    pub entity_kind: Option<String>,
    pub entity_id: Option<DbId>,
    pub details: Option<serde_json::Value>,
    pub integrity_hash: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for appending a new audit entry.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAuditEvent {
    pub actor_id: Option<DbId>,
    pub action_type: String,
    pub entity_kind: Option<String>,
    pub entity_id: Option<DbId>,
    pub details: Option<serde_json::Value>,
}

/// Filter parameters for querying audit logs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub actor_id: Option<DbId>,
    pub action_type: Option<String>,
    pub entity_kind: Option<String>,
    pub entity_id: Option<DbId>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Paginated response for audit log queries.
#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub items: Vec<AuditEvent>,
    pub total: i64,
}
