//! API route modules.

pub mod events;
pub mod health;
pub mod jobs;
pub mod settings;
pub mod subscriptions;

use axum::{Json, Router, routing::get};
use utoipa::OpenApi;

use crate::api::openapi::ApiDoc;
use crate::api::server::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/openapi.json", get(openapi_document))
        .nest("/jobs", jobs::router())
        .nest("/subscriptions", subscriptions::router())
        .nest("/settings", settings::router())
        .nest("/events", events::router())
        .nest("/health", health::router())
        .with_state(state)
}

async fn openapi_document() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
