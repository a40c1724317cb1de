//! Query route: one question in, exactly one reply out.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use deskline_runtime::{Query, Reply};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/query", post(answer))
}

/// POST /api/query
///
/// Always 200: failures are expressed in the reply's `outcome`.
async fn answer(State(state): State<Arc<AppState>>, Json(query): Json<Query>) -> Json<Reply> {
    Json(state.orchestrator.answer(&query).await)
}
