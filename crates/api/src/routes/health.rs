use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use super::{ApiError, SharedContext};

/// Liveness endpoint backed by a database check.
pub fn router() -> Router<SharedContext> {
    Router::new().route("/health", get(health))
}

/// GET /health
async fn health(State(ctx): State<SharedContext>) -> Result<Json<Value>, ApiError> {
    ctx.db.health_check()?;
    Ok(Json(json!({ "status": "ok" })))
}
