//! Repository for the import staging area (`staged_batches` + `staged_rows`).
//!
//! A batch is created from a classified preview and never touches canonical
//! data until `commit`, which runs as a single transaction: re-validation
//! against current canonical keys, inserts, the import log, the batch status
//! flip, and the audit entry all commit together or not at all.

use sqlx::PgPool;

use sokoni_core::audit::action_types;
use sokoni_core::rows::{dedupe_key, ClassifiedBatch, RowStatus};
use sokoni_core::schema::{schema_for, EntityKind};
use sokoni_core::types::DbId;

use crate::models::audit::NewAuditEvent;
use crate::models::import_log::CreateImportLog;
use crate::models::staged::{
    CommitOptions, CommitOutcome, CommitResult, StagedBatch, StagedRowRecord,
    BATCH_STATUS_COMMITTED,
};
use crate::repositories::audit_repo::AuditLogRepo;
use crate::repositories::canonical_repo::CanonicalRepo;
use crate::repositories::import_log_repo::ImportLogRepo;

/// Column list for `staged_batches` SELECT queries.
const BATCH_COLUMNS: &str = "\
    id, source_file_name, entity_kind, status, total_rows, valid_rows, \
    invalid_rows, duplicate_rows, empty_rows, warnings, created_by, \
    created_at, committed_at";

/// Column list for `staged_rows` SELECT queries.
const ROW_COLUMNS: &str =
    "id, batch_id, row_number, raw, normalized, status, also_duplicate, errors";

/// Input for persisting a classified preview as a staged batch.
#[derive(Debug)]
pub struct NewStagedBatch<'a> {
    pub source_file_name: String,
    pub entity_kind: EntityKind,
    pub created_by: Option<DbId>,
    pub classified: &'a ClassifiedBatch,
}

/// Provides staging-store operations for import batches.
pub struct StagedBatchRepo;

impl StagedBatchRepo {
    /// Persist a classified batch and its rows, and record the preview in
    /// the audit log. One transaction; no canonical writes.
    pub async fn create(
        pool: &PgPool,
        input: &NewStagedBatch<'_>,
    ) -> Result<StagedBatch, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let summary = &input.classified.summary;
        let query = format!(
            "INSERT INTO staged_batches \
                (source_file_name, entity_kind, total_rows, valid_rows, \
                 invalid_rows, duplicate_rows, empty_rows, warnings, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {BATCH_COLUMNS}"
        );
        let batch = sqlx::query_as::<_, StagedBatch>(&query)
            .bind(&input.source_file_name)
            .bind(input.entity_kind.as_str())
            .bind(summary.total as i32)
            .bind(summary.valid as i32)
            .bind(summary.invalid as i32)
            .bind(summary.duplicate as i32)
            .bind(summary.empty as i32)
            .bind(serde_json::json!(input.classified.warnings))
            .bind(input.created_by)
            .fetch_one(&mut *tx)
            .await?;

        for row in &input.classified.rows {
            sqlx::query(
                "INSERT INTO staged_rows \
                    (batch_id, row_number, raw, normalized, status, also_duplicate, errors) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(batch.id)
            .bind(row.row_number)
            .bind(serde_json::json!(row.raw))
            .bind(serde_json::Value::Object(row.normalized.clone()))
            .bind(row.status.as_str())
            .bind(row.also_duplicate)
            .bind(serde_json::json!(row.errors))
            .execute(&mut *tx)
            .await?;
        }

        AuditLogRepo::append(
            &mut *tx,
            &NewAuditEvent {
                actor_id: input.created_by,
                action_type: action_types::IMPORT_PREVIEW.to_string(),
                entity_kind: Some(input.entity_kind.as_str().to_string()),
                entity_id: Some(batch.id),
                details: Some(serde_json::json!({
                    "file_name": input.source_file_name,
                    "total_rows": summary.total,
                    "valid_rows": summary.valid,
                    "invalid_rows": summary.invalid,
                })),
            },
        )
        .await?;

        tx.commit().await?;
        Ok(batch)
    }

    /// Find a staged batch by id.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<StagedBatch>, sqlx::Error> {
        let query = format!("SELECT {BATCH_COLUMNS} FROM staged_batches WHERE id = $1");
        sqlx::query_as::<_, StagedBatch>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a batch's rows in file order, optionally capped for display.
    pub async fn list_rows(
        pool: &PgPool,
        batch_id: DbId,
        limit: Option<i64>,
    ) -> Result<Vec<StagedRowRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {ROW_COLUMNS} FROM staged_rows \
             WHERE batch_id = $1 ORDER BY row_number \
             LIMIT $2"
        );
        sqlx::query_as::<_, StagedRowRecord>(&query)
            .bind(batch_id)
            .bind(limit.unwrap_or(i64::MAX))
            .fetch_all(pool)
            .await
    }

    /// Commit a staged batch into the canonical store.
    ///
    /// Returns `None` when the batch does not exist. Rows are re-validated
    /// against canonical dedupe keys *inside* the transaction; only rows
    /// still valid at commit time are inserted.
    pub async fn commit(
        pool: &PgPool,
        batch_id: DbId,
        options: CommitOptions,
        actor: Option<DbId>,
    ) -> Result<Option<CommitOutcome>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "SELECT {BATCH_COLUMNS} FROM staged_batches WHERE id = $1 FOR UPDATE"
        );
        let Some(batch) = sqlx::query_as::<_, StagedBatch>(&query)
            .bind(batch_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        if batch.status == BATCH_STATUS_COMMITTED {
            tx.rollback().await?;
            return Ok(Some(CommitOutcome::AlreadyCommitted));
        }

        let kind = EntityKind::from_str(&batch.entity_kind)
            .ok_or_else(|| sqlx::Error::Decode(
                format!("unknown entity kind '{}'", batch.entity_kind).into(),
            ))?;

        if options.delete_existing {
            let wiped = CanonicalRepo::wipe(&mut *tx, kind).await?;
            tracing::warn!(batch_id, kind = %kind, wiped, "Wiped canonical set before import");
        }

        let mut canonical_keys = CanonicalRepo::dedupe_keys(&mut *tx, kind).await?;
        let schema = schema_for(kind);

        let rows_query = format!(
            "SELECT {ROW_COLUMNS} FROM staged_rows WHERE batch_id = $1 ORDER BY row_number"
        );
        let rows = sqlx::query_as::<_, StagedRowRecord>(&rows_query)
            .bind(batch_id)
            .fetch_all(&mut *tx)
            .await?;

        let mut success: i32 = 0;
        for row in &rows {
            if RowStatus::from_str(&row.status) != Some(RowStatus::Valid) {
                continue;
            }
            let Some(normalized) = row.normalized.as_object() else {
                tracing::warn!(batch_id, row = row.row_number, "Staged row has no normalized map");
                continue;
            };

            let key = dedupe_key(&schema, normalized);
            if let Some(k) = &key {
                if canonical_keys.contains(k) {
                    if options.merge_mode {
                        // A previously-unique row became a duplicate; skip it
                        // and keep the commit going.
                        continue;
                    }
                    tx.rollback().await?;
                    return Ok(Some(CommitOutcome::Collision(format!(
                        "row {} collides with an existing {} record",
                        row.row_number, kind
                    ))));
                }
            }

            match CanonicalRepo::insert_row(&mut *tx, kind, normalized).await? {
                Ok(_) => {
                    success += 1;
                    if let Some(k) = key {
                        canonical_keys.insert(k);
                    }
                }
                Err(reason) => {
                    tracing::warn!(batch_id, row = row.row_number, %reason, "Row not committed");
                }
            }
        }

        // Everything that is not an inserted row and not empty counts as
        // failed: invalid rows, preview duplicates, and commit-time skips.
        let failed = batch.total_rows - batch.empty_rows - success;

        ImportLogRepo::create(
            &mut *tx,
            &CreateImportLog {
                file_name: batch.source_file_name.clone(),
                entity_kind: batch.entity_kind.clone(),
                total_rows: batch.total_rows,
                success_rows: success,
                failed_rows: failed,
                committed_by: actor,
            },
        )
        .await?;

        sqlx::query(
            "UPDATE staged_batches SET status = $2, committed_at = now() WHERE id = $1",
        )
        .bind(batch_id)
        .bind(BATCH_STATUS_COMMITTED)
        .execute(&mut *tx)
        .await?;

        AuditLogRepo::append(
            &mut *tx,
            &NewAuditEvent {
                actor_id: actor,
                action_type: action_types::IMPORT_COMMIT.to_string(),
                entity_kind: Some(batch.entity_kind.clone()),
                entity_id: Some(batch_id),
                details: Some(serde_json::json!({
                    "file_name": batch.source_file_name,
                    "success_rows": success,
                    "failed_rows": failed,
                    "delete_existing": options.delete_existing,
                    "merge_mode": options.merge_mode,
                })),
            },
        )
        .await?;

        tx.commit().await?;
        Ok(Some(CommitOutcome::Committed(CommitResult {
            success_rows: success,
            failed_rows: failed,
        })))
    }

    /// Discard an uncommitted batch and its rows.
    ///
    /// Returns `None` when the batch does not exist and `Some(false)` when
    /// it was already committed. The import log, if any, is kept.
    pub async fn discard(
        pool: &PgPool,
        batch_id: DbId,
        actor: Option<DbId>,
    ) -> Result<Option<bool>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "SELECT {BATCH_COLUMNS} FROM staged_batches WHERE id = $1 FOR UPDATE"
        );
        let Some(batch) = sqlx::query_as::<_, StagedBatch>(&query)
            .bind(batch_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        if batch.status == BATCH_STATUS_COMMITTED {
            tx.rollback().await?;
            return Ok(Some(false));
        }

        sqlx::query("DELETE FROM staged_batches WHERE id = $1")
            .bind(batch_id)
            .execute(&mut *tx)
            .await?;

        AuditLogRepo::append(
            &mut *tx,
            &NewAuditEvent {
                actor_id: actor,
                action_type: action_types::IMPORT_DISCARD.to_string(),
                entity_kind: Some(batch.entity_kind.clone()),
                entity_id: Some(batch_id),
                details: Some(serde_json::json!({
                    "file_name": batch.source_file_name,
                })),
            },
        )
        .await?;

        tx.commit().await?;
        Ok(Some(true))
    }

    /// Count canonical dedupe keys for an entity kind using a pooled
    /// connection (for preview classification, outside any transaction).
    pub async fn canonical_keys(
        pool: &PgPool,
        kind: EntityKind,
    ) -> Result<std::collections::HashSet<String>, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        CanonicalRepo::dedupe_keys(&mut *conn, kind).await
    }
}
