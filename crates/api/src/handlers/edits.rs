//! Handlers for the moderation gateway: submitting user edits and deciding
//! their fate.
//!
//! This module is the only entry point that moves a pending edit into a
//! terminal state. Deltas are computed once at submission time and cached on
//! the edit; approval applies those absolute values even if the canonical
//! entity drifted in the meantime (last-writer-wins on the submitted
//! fields) -- a known limitation, not a hidden one.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use sokoni_core::delta::{compute_delta, FieldDelta};
use sokoni_core::error::CoreError;
use sokoni_core::moderation::validate_reject_reason;
use sokoni_core::schema::{normalize_proposed, schema_for, EntityKind};
use sokoni_core::types::DbId;
use sokoni_db::models::pending_edit::{
    DecisionOutcome, NewPendingEdit, PendingEdit, PendingEditWithEntity,
};
use sokoni_db::repositories::{CanonicalRepo, PendingEditRepo};

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::{RequireAuth, RequireModerator};
use crate::response::DataResponse;
use crate::state::AppState;

// ── Submit ───────────────────────────────────────────────────────────

/// Request body for submitting an edit to a live entity.
#[derive(Debug, Deserialize)]
pub struct SubmitEditRequest {
    pub entity_kind: String,
    pub entity_id: DbId,
    /// Only the fields the submitter intends to change.
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// POST /api/v1/edits
///
/// Validate the proposed fields against the entity schema, compute the
/// delta against the current canonical state, and stage a pending edit.
/// Fails with 409 if the entity already has an outstanding pending edit.
pub async fn submit_edit(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<SubmitEditRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<PendingEdit>>)> {
    let kind = EntityKind::from_str(&body.entity_kind).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Unknown entity kind '{}'. Must be one of: {}",
            body.entity_kind,
            EntityKind::ALL.join(", ")
        ))
    })?;

    // Friendly pre-check. The partial unique index still closes the race
    // between two concurrent submits; this just gives the common case a
    // clear message without a constraint round-trip.
    if PendingEditRepo::find_pending_for(&state.pool, kind.as_str(), body.entity_id)
        .await?
        .is_some()
    {
        return Err(AppError::Core(CoreError::Conflict(
            "A pending edit already exists for this entity".to_string(),
        )));
    }

    let mut conn = state.pool.acquire().await?;
    let canonical = CanonicalRepo::snapshot(&mut *conn, kind, body.entity_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: entity_name(kind),
            id: body.entity_id,
        }))?;
    drop(conn);

    let schema = schema_for(kind);
    let proposed = normalize_proposed(&schema, &body.fields)
        .map_err(|e| AppError::Core(CoreError::Validation(e)))?;

    let deltas = compute_delta(&canonical, &proposed, &schema);
    if deltas.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Proposed fields are identical to the current entity; nothing to review"
                .to_string(),
        )));
    }

    let deltas_json = serde_json::to_value(&deltas)
        .map_err(|e| AppError::InternalError(format!("failed to encode deltas: {e}")))?;

    let edit = PendingEditRepo::submit(
        &state.pool,
        &NewPendingEdit {
            entity_kind: kind.as_str().to_string(),
            entity_id: body.entity_id,
            proposed: serde_json::Value::Object(proposed),
            deltas: deltas_json,
            requested_by: user.user_id,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: edit })))
}

// ── Pending queue ────────────────────────────────────────────────────

/// GET /api/v1/edits/pending
///
/// List pending edits with their canonical entity snapshots, for
/// side-by-side diff rendering in the moderator UI.
pub async fn list_pending(
    State(state): State<AppState>,
    RequireModerator(_moderator): RequireModerator,
) -> AppResult<Json<DataResponse<Vec<PendingEditWithEntity>>>> {
    let pending = PendingEditRepo::list_pending(&state.pool).await?;
    Ok(Json(DataResponse { data: pending }))
}

// ── Approve / Reject ─────────────────────────────────────────────────

/// Request body for approving a pending edit.
#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    pub notes: Option<String>,
}

/// POST /api/v1/edits/{id}/approve
///
/// Apply the cached deltas to the canonical entity and mark the edit
/// approved, atomically. Approving an already-decided edit returns the
/// stored result without re-applying.
pub async fn approve_edit(
    State(state): State<AppState>,
    RequireModerator(moderator): RequireModerator,
    Path(edit_id): Path<DbId>,
    Json(body): Json<ApproveRequest>,
) -> AppResult<Json<DataResponse<PendingEdit>>> {
    let outcome =
        PendingEditRepo::approve(&state.pool, edit_id, moderator.user_id, body.notes.as_deref())
            .await?
            .ok_or(AppError::Core(CoreError::NotFound {
                entity: "PendingEdit",
                id: edit_id,
            }))?;

    match outcome {
        DecisionOutcome::Applied(edit) | DecisionOutcome::AlreadyDecided(edit) => {
            Ok(Json(DataResponse { data: edit }))
        }
        DecisionOutcome::ApplyFailed { reason, .. } => {
            Err(AppError::Core(CoreError::ApplyFailed(reason)))
        }
    }
}

/// Request body for rejecting a pending edit.
#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

/// POST /api/v1/edits/{id}/reject
///
/// Mark the edit rejected without touching canonical data. Edits that
/// change the price require an explicit reason.
pub async fn reject_edit(
    State(state): State<AppState>,
    RequireModerator(moderator): RequireModerator,
    Path(edit_id): Path<DbId>,
    Json(body): Json<RejectRequest>,
) -> AppResult<Json<DataResponse<PendingEdit>>> {
    let edit = PendingEditRepo::find_by_id(&state.pool, edit_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "PendingEdit",
            id: edit_id,
        }))?;

    let deltas: Vec<FieldDelta> =
        serde_json::from_value(edit.deltas.clone()).unwrap_or_default();
    validate_reject_reason(&deltas, body.reason.as_deref()).map_err(AppError::Core)?;

    let outcome =
        PendingEditRepo::reject(&state.pool, edit_id, moderator.user_id, body.reason.as_deref())
            .await?
            .ok_or(AppError::Core(CoreError::NotFound {
                entity: "PendingEdit",
                id: edit_id,
            }))?;

    match outcome {
        DecisionOutcome::Applied(edit) | DecisionOutcome::AlreadyDecided(edit) => {
            Ok(Json(DataResponse { data: edit }))
        }
        DecisionOutcome::ApplyFailed { reason, .. } => {
            Err(AppError::Core(CoreError::ApplyFailed(reason)))
        }
    }
}

// ── Private helpers ──────────────────────────────────────────────────

fn entity_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Listing => "Listing",
        EntityKind::City => "City",
        EntityKind::Street => "Street",
    }
}
