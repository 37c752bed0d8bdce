//! Route definitions for the `/admin/audit-logs` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::audit;
use crate::state::AppState;

/// Routes mounted at `/admin/audit-logs`.
///
/// ```text
/// GET    /    -> query_audit_logs
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(audit::query_audit_logs))
}
