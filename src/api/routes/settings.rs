//! Settings routes.
//!
//! A successful PUT fires the live-update hook: the dynamic limiter picks
//! up `maxConcurrentDownloads` and the worker pool `maxWorkers`.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::database::models::Settings;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_settings).put(put_settings))
}

#[utoipa::path(
    get,
    path = "/settings",
    tag = "settings",
    responses((status = 200, description = "Current settings", body = Object))
)]
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<Settings>> {
    Ok(Json(state.settings.get().await?))
}

#[utoipa::path(
    put,
    path = "/settings",
    tag = "settings",
    request_body = Object,
    responses(
        (status = 200, description = "Stored (normalized) settings", body = Object),
        (status = 400, description = "Invalid body", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn put_settings(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> ApiResult<Json<Settings>> {
    Ok(Json(state.settings.put(settings).await?))
}
