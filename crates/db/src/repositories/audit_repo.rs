//! Repository for the `audit_logs` table.
//!
//! Appends run on `&mut PgConnection` so callers can write the audit entry
//! inside the same transaction as the mutation it records: the mutation and
//! its audit trail commit or roll back together.

use sqlx::{PgConnection, PgPool};

use sokoni_core::audit::{compute_integrity_hash, redact_sensitive_fields};
use sokoni_core::types::DbId;

use crate::models::audit::{AuditEvent, AuditQuery, NewAuditEvent};

/// Column list for `audit_logs` SELECT queries.
const COLUMNS: &str = "\
    id, actor_id, action_type, entity_kind, entity_id, \
    details, integrity_hash, created_at";

/// Provides append and query operations for audit logs.
pub struct AuditLogRepo;

impl AuditLogRepo {
    /// Append one audit entry, chaining its integrity hash from the most
    /// recent entry. Details are redacted before storage.
    pub async fn append(
        conn: &mut PgConnection,
        entry: &NewAuditEvent,
    ) -> Result<AuditEvent, sqlx::Error> {
        let prev_hash: Option<String> = sqlx::query_scalar::<_, Option<String>>(
            "SELECT integrity_hash FROM audit_logs ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&mut *conn)
        .await?
        .flatten();

        let details = entry.details.as_ref().map(redact_sensitive_fields);

        let entry_data = serde_json::json!({
            "actor_id": entry.actor_id,
            "action_type": entry.action_type,
            "entity_kind": entry.entity_kind,
            "entity_id": entry.entity_id,
            "details": details,
        })
        .to_string();
        let hash = compute_integrity_hash(prev_hash.as_deref(), &entry_data);

        let query = format!(
            "INSERT INTO audit_logs \
                (actor_id, action_type, entity_kind, entity_id, details, integrity_hash) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AuditEvent>(&query)
            .bind(entry.actor_id)
            .bind(&entry.action_type)
            .bind(&entry.entity_kind)
            .bind(entry.entity_id)
            .bind(&details)
            .bind(&hash)
            .fetch_one(conn)
            .await
    }

    /// Query audit logs with filtering and pagination, newest first.
    pub async fn query(
        pool: &PgPool,
        params: &AuditQuery,
    ) -> Result<Vec<AuditEvent>, sqlx::Error> {
        let limit = params.limit.unwrap_or(50).min(500);
        let offset = params.offset.unwrap_or(0);

        let query = format!(
            "SELECT {COLUMNS} FROM audit_logs \
             WHERE ($1::BIGINT IS NULL OR actor_id = $1) \
               AND ($2::TEXT IS NULL OR action_type = $2) \
               AND ($3::TEXT IS NULL OR entity_kind = $3) \
               AND ($4::BIGINT IS NULL OR entity_id = $4) \
               AND ($5::TIMESTAMPTZ IS NULL OR created_at >= $5) \
               AND ($6::TIMESTAMPTZ IS NULL OR created_at <= $6) \
             ORDER BY id DESC \
             LIMIT $7 OFFSET $8"
        );
        sqlx::query_as::<_, AuditEvent>(&query)
            .bind(params.actor_id)
            .bind(&params.action_type)
            .bind(&params.entity_kind)
            .bind(params.entity_id)
            .bind(params.from)
            .bind(params.to)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Count audit logs matching the given filter (for pagination metadata).
    pub async fn count(pool: &PgPool, params: &AuditQuery) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*)::BIGINT FROM audit_logs \
             WHERE ($1::BIGINT IS NULL OR actor_id = $1) \
               AND ($2::TEXT IS NULL OR action_type = $2) \
               AND ($3::TEXT IS NULL OR entity_kind = $3) \
               AND ($4::BIGINT IS NULL OR entity_id = $4) \
               AND ($5::TIMESTAMPTZ IS NULL OR created_at >= $5) \
               AND ($6::TIMESTAMPTZ IS NULL OR created_at <= $6)",
        )
        .bind(params.actor_id)
        .bind(&params.action_type)
        .bind(&params.entity_kind)
        .bind(params.entity_id)
        .bind(params.from)
        .bind(params.to)
        .fetch_one(pool)
        .await
    }

    /// Count entries recorded against one entity (used by tests and the
    /// integrity endpoint).
    pub async fn count_for_entity(
        pool: &PgPool,
        entity_kind: &str,
        entity_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*)::BIGINT FROM audit_logs \
             WHERE entity_kind = $1 AND entity_id = $2",
        )
        .bind(entity_kind)
        .bind(entity_id)
        .fetch_one(pool)
        .await
    }
}
