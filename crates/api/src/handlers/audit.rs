//! Handlers for audit log endpoints. All endpoints require admin role.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use sokoni_db::models::audit::{AuditPage, AuditQuery};
use sokoni_db::repositories::AuditLogRepo;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for audit log queries.
#[derive(Debug, Deserialize)]
pub struct AuditLogQueryParams {
    pub actor_id: Option<i64>,
    pub action_type: Option<String>,
    pub entity_kind: Option<String>,
    pub entity_id: Option<i64>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Parse an optional ISO 8601 timestamp string.
fn parse_timestamp(
    s: &Option<String>,
) -> AppResult<Option<chrono::DateTime<chrono::Utc>>> {
    match s {
        Some(v) => v
            .parse::<chrono::DateTime<chrono::Utc>>()
            .map(Some)
            .map_err(|_| AppError::BadRequest("Invalid date format".into())),
        None => Ok(None),
    }
}

/// GET /api/v1/admin/audit-logs
///
/// Query audit logs with filters and pagination. Admin only.
pub async fn query_audit_logs(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(params): Query<AuditLogQueryParams>,
) -> AppResult<Json<DataResponse<AuditPage>>> {
    let query = AuditQuery {
        actor_id: params.actor_id,
        action_type: params.action_type,
        entity_kind: params.entity_kind,
        entity_id: params.entity_id,
        from: parse_timestamp(&params.from)?,
        to: parse_timestamp(&params.to)?,
        limit: params.limit,
        offset: params.offset,
    };

    let items = AuditLogRepo::query(&state.pool, &query).await?;
    let total = AuditLogRepo::count(&state.pool, &query).await?;

    Ok(Json(DataResponse {
        data: AuditPage { items, total },
    }))
}
