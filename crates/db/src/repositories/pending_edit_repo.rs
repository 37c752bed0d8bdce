//! Repository for the `pending_edits` table: the staging side of the
//! moderation workflow.
//!
//! The one-pending-edit-per-entity invariant is enforced by the partial
//! unique index `uq_pending_edits_one_pending`, so two concurrent submits
//! race at the store level and exactly one wins. Approve and reject run in
//! a single transaction with the canonical row locked; a terminal edit is
//! returned as-is without re-executing any writes.

use sqlx::PgPool;

use sokoni_core::audit::action_types;
use sokoni_core::delta::FieldDelta;
use sokoni_core::moderation::EditStatus;
use sokoni_core::schema::EntityKind;
use sokoni_core::types::DbId;

use crate::models::audit::NewAuditEvent;
use crate::models::pending_edit::{
    DecisionOutcome, NewPendingEdit, PendingEdit, PendingEditWithEntity,
};
use crate::repositories::audit_repo::AuditLogRepo;
use crate::repositories::canonical_repo::CanonicalRepo;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, entity_kind, entity_id, proposed, deltas, status, requested_by, \
    requested_at, reviewed_by, reviewed_at, admin_notes, reject_reason, \
    failure_reason";

/// Provides staging and decision operations for pending edits.
pub struct PendingEditRepo;

impl PendingEditRepo {
    /// Insert a new pending edit and record the submission in the audit
    /// log, in one transaction.
    ///
    /// A concurrent pending edit for the same entity violates
    /// `uq_pending_edits_one_pending`, which surfaces as a unique-constraint
    /// database error and is classified to a conflict by the HTTP layer.
    pub async fn submit(pool: &PgPool, input: &NewPendingEdit) -> Result<PendingEdit, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO pending_edits \
                (entity_kind, entity_id, proposed, deltas, requested_by) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        let edit = sqlx::query_as::<_, PendingEdit>(&query)
            .bind(&input.entity_kind)
            .bind(input.entity_id)
            .bind(&input.proposed)
            .bind(&input.deltas)
            .bind(input.requested_by)
            .fetch_one(&mut *tx)
            .await?;

        AuditLogRepo::append(
            &mut *tx,
            &NewAuditEvent {
                actor_id: Some(input.requested_by),
                action_type: action_types::EDIT_SUBMIT.to_string(),
                entity_kind: Some(edit.entity_kind.clone()),
                entity_id: Some(edit.entity_id),
                details: Some(serde_json::json!({
                    "pending_edit_id": edit.id,
                    "delta_count": edit.deltas.as_array().map_or(0, Vec::len),
                })),
            },
        )
        .await?;

        tx.commit().await?;
        Ok(edit)
    }

    /// Find a pending edit by id.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<PendingEdit>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM pending_edits WHERE id = $1");
        sqlx::query_as::<_, PendingEdit>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find the outstanding pending edit for an entity, if any.
    pub async fn find_pending_for(
        pool: &PgPool,
        entity_kind: &str,
        entity_id: DbId,
    ) -> Result<Option<PendingEdit>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pending_edits \
             WHERE entity_kind = $1 AND entity_id = $2 AND status = 'pending'"
        );
        sqlx::query_as::<_, PendingEdit>(&query)
            .bind(entity_kind)
            .bind(entity_id)
            .fetch_optional(pool)
            .await
    }

    /// List every pending edit joined with a snapshot of its canonical
    /// entity, for the moderator queue's side-by-side diff rendering.
    pub async fn list_pending(pool: &PgPool) -> Result<Vec<PendingEditWithEntity>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pending_edits \
             WHERE status = 'pending' ORDER BY requested_at"
        );
        let edits = sqlx::query_as::<_, PendingEdit>(&query)
            .fetch_all(pool)
            .await?;

        let mut conn = pool.acquire().await?;
        let mut out = Vec::with_capacity(edits.len());
        for edit in edits {
            let snapshot = match EntityKind::from_str(&edit.entity_kind) {
                Some(kind) => {
                    CanonicalRepo::snapshot(&mut *conn, kind, edit.entity_id).await?
                }
                None => None,
            };
            out.push(PendingEditWithEntity {
                entity: snapshot
                    .map(serde_json::Value::Object)
                    .unwrap_or(serde_json::Value::Null),
                has_pending_changes: true,
                edit,
            });
        }
        Ok(out)
    }

    /// Approve a pending edit: apply every cached delta to the canonical
    /// entity and flip the edit to `approved`, atomically.
    ///
    /// Returns `None` when the edit does not exist. An already-terminal
    /// edit is returned unchanged without re-applying. A failed apply rolls
    /// the canonical writes back, records the reason on the edit, and
    /// leaves it pending.
    pub async fn approve(
        pool: &PgPool,
        id: DbId,
        reviewer_id: DbId,
        notes: Option<&str>,
    ) -> Result<Option<DecisionOutcome>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!("SELECT {COLUMNS} FROM pending_edits WHERE id = $1 FOR UPDATE");
        let Some(edit) = sqlx::query_as::<_, PendingEdit>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        if EditStatus::from_str(&edit.status).is_some_and(|s| s.is_terminal()) {
            tx.rollback().await?;
            return Ok(Some(DecisionOutcome::AlreadyDecided(edit)));
        }

        let kind = match EntityKind::from_str(&edit.entity_kind) {
            Some(kind) => kind,
            None => {
                let reason = format!("unknown entity kind '{}'", edit.entity_kind);
                tx.rollback().await?;
                let edit = Self::record_failure(pool, id, &reason).await?;
                return Ok(Some(DecisionOutcome::ApplyFailed { edit, reason }));
            }
        };

        let deltas: Vec<FieldDelta> = match serde_json::from_value(edit.deltas.clone()) {
            Ok(deltas) => deltas,
            Err(e) => {
                let reason = format!("cached deltas are unreadable: {e}");
                tx.rollback().await?;
                let edit = Self::record_failure(pool, id, &reason).await?;
                return Ok(Some(DecisionOutcome::ApplyFailed { edit, reason }));
            }
        };

        match CanonicalRepo::apply_deltas(&mut *tx, kind, edit.entity_id, &deltas).await? {
            Err(reason) => {
                // Canonical entity untouched; edit stays pending with the
                // diagnostic attached.
                tx.rollback().await?;
                let edit = Self::record_failure(pool, id, &reason).await?;
                Ok(Some(DecisionOutcome::ApplyFailed { edit, reason }))
            }
            Ok(()) => {
                let update = format!(
                    "UPDATE pending_edits \
                     SET status = 'approved', reviewed_by = $2, reviewed_at = now(), \
                         admin_notes = $3, failure_reason = NULL \
                     WHERE id = $1 \
                     RETURNING {COLUMNS}"
                );
                let updated = sqlx::query_as::<_, PendingEdit>(&update)
                    .bind(id)
                    .bind(reviewer_id)
                    .bind(notes)
                    .fetch_one(&mut *tx)
                    .await?;

                AuditLogRepo::append(
                    &mut *tx,
                    &NewAuditEvent {
                        actor_id: Some(reviewer_id),
                        action_type: action_types::EDIT_APPROVE.to_string(),
                        entity_kind: Some(updated.entity_kind.clone()),
                        entity_id: Some(updated.entity_id),
                        details: Some(serde_json::json!({
                            "pending_edit_id": updated.id,
                            "notes": notes,
                        })),
                    },
                )
                .await?;

                tx.commit().await?;
                Ok(Some(DecisionOutcome::Applied(updated)))
            }
        }
    }

    /// Reject a pending edit. The canonical entity is never touched; the
    /// reason is stored for audit even when optional.
    pub async fn reject(
        pool: &PgPool,
        id: DbId,
        reviewer_id: DbId,
        reason: Option<&str>,
    ) -> Result<Option<DecisionOutcome>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!("SELECT {COLUMNS} FROM pending_edits WHERE id = $1 FOR UPDATE");
        let Some(edit) = sqlx::query_as::<_, PendingEdit>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        if EditStatus::from_str(&edit.status).is_some_and(|s| s.is_terminal()) {
            tx.rollback().await?;
            return Ok(Some(DecisionOutcome::AlreadyDecided(edit)));
        }

        let update = format!(
            "UPDATE pending_edits \
             SET status = 'rejected', reviewed_by = $2, reviewed_at = now(), \
                 reject_reason = $3 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, PendingEdit>(&update)
            .bind(id)
            .bind(reviewer_id)
            .bind(reason)
            .fetch_one(&mut *tx)
            .await?;

        AuditLogRepo::append(
            &mut *tx,
            &NewAuditEvent {
                actor_id: Some(reviewer_id),
                action_type: action_types::EDIT_REJECT.to_string(),
                entity_kind: Some(updated.entity_kind.clone()),
                entity_id: Some(updated.entity_id),
                details: Some(serde_json::json!({
                    "pending_edit_id": updated.id,
                    "reason": reason,
                })),
            },
        )
        .await?;

        tx.commit().await?;
        Ok(Some(DecisionOutcome::Applied(updated)))
    }

    /// Record an apply failure on a still-pending edit.
    async fn record_failure(
        pool: &PgPool,
        id: DbId,
        reason: &str,
    ) -> Result<PendingEdit, sqlx::Error> {
        let query = format!(
            "UPDATE pending_edits SET failure_reason = $2 WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PendingEdit>(&query)
            .bind(id)
            .bind(reason)
            .fetch_one(pool)
            .await
    }
}
