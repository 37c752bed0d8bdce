//! Handlers for the bulk-import staging pipeline.
//!
//! Preview runs full validation over every row (classification happens on a
//! blocking worker thread so large files never stall the request loop) and
//! persists the result as a staged batch. Commit re-validates against the
//! canonical store inside one transaction.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use sokoni_core::error::CoreError;
use sokoni_core::rows::{classify_batch, ClassifiedRow, PREVIEW_DISPLAY_ROWS};
use sokoni_core::schema::{schema_for, EntityKind};
use sokoni_core::types::DbId;
use sokoni_db::models::staged::{
    CommitOptions, CommitOutcome, CommitResult, StagedBatch, StagedRowRecord,
};
use sokoni_db::repositories::{ImportLogRepo, NewStagedBatch, StagedBatchRepo};

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

// ── Preview ──────────────────────────────────────────────────────────

/// Request body for the import preview endpoint.
#[derive(Debug, Deserialize, Validate)]
pub struct PreviewRequest {
    pub entity_kind: String,
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    /// Raw rows as read from the source file, field name to cell text.
    #[validate(length(min = 1, message = "rows array must not be empty"))]
    pub rows: Vec<HashMap<String, String>>,
}

/// Response payload for a created preview.
#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub batch_id: DbId,
    pub file_name: String,
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub duplicates: usize,
    pub empty_rows: usize,
    pub warnings: Vec<String>,
    /// Capped at [`PREVIEW_DISPLAY_ROWS`]; counters cover all rows.
    pub preview: Vec<ClassifiedRow>,
}

/// POST /api/v1/imports/preview
///
/// Classify every row of an uploaded file against the entity schema and
/// stage the batch. No canonical data is touched.
pub async fn preview(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<PreviewRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<PreviewResponse>>)> {
    let kind = parse_kind(&body.entity_kind)?;
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let existing_keys = StagedBatchRepo::canonical_keys(&state.pool, kind).await?;

    // Classification is CPU-bound for large batches; keep it off the
    // request-handling threads.
    let rows = body.rows;
    let schema = schema_for(kind);
    let classified = tokio::task::spawn_blocking(move || {
        classify_batch(&rows, &schema, &existing_keys)
    })
    .await
    .map_err(|e| AppError::InternalError(format!("classification task failed: {e}")))?
    .map_err(AppError::Core)?;

    let batch = StagedBatchRepo::create(
        &state.pool,
        &NewStagedBatch {
            source_file_name: body.file_name.clone(),
            entity_kind: kind,
            created_by: Some(admin.user_id),
            classified: &classified,
        },
    )
    .await?;

    let preview_rows: Vec<ClassifiedRow> = classified
        .rows
        .iter()
        .take(PREVIEW_DISPLAY_ROWS)
        .cloned()
        .collect();

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: PreviewResponse {
                batch_id: batch.id,
                file_name: body.file_name,
                total_rows: classified.summary.total,
                valid_rows: classified.summary.valid,
                invalid_rows: classified.summary.invalid,
                duplicates: classified.summary.duplicate,
                empty_rows: classified.summary.empty,
                warnings: classified.warnings,
                preview: preview_rows,
            },
        }),
    ))
}

// ── Commit ───────────────────────────────────────────────────────────

/// Request body for the import commit endpoint.
#[derive(Debug, Deserialize)]
pub struct CommitRequest {
    /// Wipe the canonical set of this entity kind before inserting.
    #[serde(default)]
    pub delete_existing: bool,
    /// Explicit confirmation for `delete_existing`; never inferred.
    #[serde(default)]
    pub confirm_wipe: bool,
    /// Skip rows whose dedupe key now exists instead of failing the commit.
    #[serde(default)]
    pub merge_mode: bool,
}

/// POST /api/v1/imports/{id}/commit
///
/// Commit a staged batch. Only rows still valid at commit time are
/// inserted; a committed batch cannot be committed again.
pub async fn commit(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(batch_id): Path<DbId>,
    Json(body): Json<CommitRequest>,
) -> AppResult<Json<DataResponse<CommitResult>>> {
    if body.delete_existing && !body.confirm_wipe {
        return Err(AppError::BadRequest(
            "delete_existing is destructive and requires confirm_wipe: true".to_string(),
        ));
    }

    let options = CommitOptions {
        delete_existing: body.delete_existing,
        merge_mode: body.merge_mode,
    };

    let outcome = StagedBatchRepo::commit(&state.pool, batch_id, options, Some(admin.user_id))
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "StagedBatch",
            id: batch_id,
        }))?;

    match outcome {
        CommitOutcome::Committed(result) => Ok(Json(DataResponse { data: result })),
        CommitOutcome::AlreadyCommitted => Err(AppError::Core(CoreError::Conflict(
            "Batch has already been committed".to_string(),
        ))),
        CommitOutcome::Collision(msg) => Err(AppError::Core(CoreError::Conflict(msg))),
    }
}

// ── Batch retrieval ──────────────────────────────────────────────────

/// Response payload for a staged batch with its rows.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub batch: StagedBatch,
    /// Capped at [`PREVIEW_DISPLAY_ROWS`] rows for display.
    pub rows: Vec<StagedRowRecord>,
}

/// GET /api/v1/imports/{id}
///
/// Retrieve a staged batch and a display-capped slice of its rows.
pub async fn get_batch(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(batch_id): Path<DbId>,
) -> AppResult<Json<DataResponse<BatchResponse>>> {
    let batch = StagedBatchRepo::find_by_id(&state.pool, batch_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "StagedBatch",
            id: batch_id,
        }))?;

    let rows =
        StagedBatchRepo::list_rows(&state.pool, batch_id, Some(PREVIEW_DISPLAY_ROWS as i64))
            .await?;

    Ok(Json(DataResponse {
        data: BatchResponse { batch, rows },
    }))
}

// ── Discard ──────────────────────────────────────────────────────────

/// DELETE /api/v1/imports/{id}
///
/// Discard an uncommitted batch. Committed batches are history and cannot
/// be discarded; their import log remains either way.
pub async fn discard(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(batch_id): Path<DbId>,
) -> AppResult<StatusCode> {
    let discarded = StagedBatchRepo::discard(&state.pool, batch_id, Some(admin.user_id))
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "StagedBatch",
            id: batch_id,
        }))?;

    if !discarded {
        return Err(AppError::Core(CoreError::Conflict(
            "A committed batch cannot be discarded".to_string(),
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ── Import logs ──────────────────────────────────────────────────────

/// Query parameters for listing import logs.
#[derive(Debug, Deserialize)]
pub struct ListLogsParams {
    pub limit: Option<i64>,
}

/// GET /api/v1/imports/logs
///
/// List terminal import summaries, newest first.
pub async fn list_logs(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(params): Query<ListLogsParams>,
) -> AppResult<Json<DataResponse<Vec<sokoni_db::models::import_log::ImportLog>>>> {
    let logs = ImportLogRepo::list(&state.pool, params.limit).await?;
    Ok(Json(DataResponse { data: logs }))
}

// ── Private helpers ──────────────────────────────────────────────────

fn parse_kind(raw: &str) -> Result<EntityKind, AppError> {
    EntityKind::from_str(raw).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Unknown entity kind '{raw}'. Must be one of: {}",
            EntityKind::ALL.join(", ")
        ))
    })
}
