//! Route definitions for the `/imports` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::imports;
use crate::state::AppState;

/// Routes mounted at `/imports`.
///
/// ```text
/// POST   /preview        -> preview      (stage + classify)
/// GET    /logs           -> list_logs
/// GET    /{id}           -> get_batch
/// DELETE /{id}           -> discard
/// POST   /{id}/commit    -> commit
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/preview", post(imports::preview))
        .route("/logs", get(imports::list_logs))
        .route("/{id}", get(imports::get_batch).delete(imports::discard))
        .route("/{id}/commit", post(imports::commit))
}
