//! Service status route.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tracing::warn;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/status", get(get_status))
}

/// GET /api/status: store connectivity, active backend and budget policy.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stats = match state.store.store() {
        Some(store) => match store.get_stats() {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("Store stats unavailable: {}", e);
                None
            }
        },
        None => None,
    };

    let (provider, model) = {
        let config = state.llm_config.read();
        match config.resolve_provider() {
            Some(r) => (Some(r.provider.to_string()), Some(r.model)),
            None => (None, None),
        }
    };

    Json(serde_json::json!({
        "store": {
            "connected": state.store.is_connected(),
            "records": stats.as_ref().map_or(0, |s| s.total_records),
            "courses": stats.as_ref().map_or(0, |s| s.total_courses),
            "dbPath": stats.as_ref().map(|s| s.db_path.clone()),
            "dbSizeMb": stats.as_ref().map_or(0.0, |s| s.db_size_mb),
        },
        "backend": {
            "activeProvider": provider,
            "model": model,
        },
        "budget": state.orchestrator.policy(),
    }))
}
