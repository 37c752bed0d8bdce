//! Route definitions for the `/edits` resource (moderation workflow).

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::edits;
use crate::state::AppState;

/// Routes mounted at `/edits`.
///
/// ```text
/// POST   /               -> submit_edit
/// GET    /pending        -> list_pending
/// POST   /{id}/approve   -> approve_edit
/// POST   /{id}/reject    -> reject_edit
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(edits::submit_edit))
        .route("/pending", get(edits::list_pending))
        .route("/{id}/approve", post(edits::approve_edit))
        .route("/{id}/reject", post(edits::reject_edit))
}
