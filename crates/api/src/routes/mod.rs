pub mod audit;
pub mod edits;
pub mod health;
pub mod imports;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /imports/preview                 stage a classified batch (admin)
/// /imports/logs                    import history (admin)
/// /imports/{id}                    staged batch with rows (admin)
/// /imports/{id}/commit             commit a staged batch (admin)
///
/// /edits                           submit an edit (any authed user)
/// /edits/pending                   moderation queue (moderator)
/// /edits/{id}/approve              apply and approve (moderator)
/// /edits/{id}/reject               reject (moderator)
///
/// /admin/audit-logs                query the audit trail (admin)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/imports", imports::router())
        .nest("/edits", edits::router())
        .nest("/admin/audit-logs", audit::router())
}
