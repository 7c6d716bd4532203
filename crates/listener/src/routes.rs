//! Route table.

use axum::{routing::get, Router};

use crate::handlers::{cancel, health, status, submit};
use crate::state::AppState;

/// The full HTTP surface.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/pipeline", get(status).post(submit).delete(cancel))
        .route("/health", get(health))
        .with_state(state)
}
