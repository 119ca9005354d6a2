//! Liveness endpoint.

use axum::{Json, Router, routing::get};
use serde_json::json;

use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is alive"))
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
