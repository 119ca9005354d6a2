//! Subscription routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::subscriptions::{
    CreateSubscriptionRequest, SubscriptionDto, SyncResult, UpdateSubscriptionRequest,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_subscription).get(list_subscriptions))
        .route(
            "/{id}",
            get(get_subscription)
                .put(update_subscription)
                .delete(delete_subscription),
        )
        .route("/{id}/sync", post(sync_subscription))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListSubscriptionsParams {
    /// Maximum number of subscriptions to return; omit for all.
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct SyncParams {
    /// Whether to enqueue download jobs for new episodes (default true).
    pub enqueue: Option<bool>,
}

#[utoipa::path(
    post,
    path = "/subscriptions",
    tag = "subscriptions",
    request_body = CreateSubscriptionRequest,
    responses(
        (status = 201, description = "Subscription created", body = SubscriptionDto),
        (status = 400, description = "Invalid body", body = crate::api::error::ApiErrorResponse),
        (status = 409, description = "Duplicate base URL", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn create_subscription(
    State(state): State<AppState>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> ApiResult<(StatusCode, Json<SubscriptionDto>)> {
    let created = state.subscriptions.create(req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/subscriptions",
    tag = "subscriptions",
    params(ListSubscriptionsParams),
    responses((status = 200, description = "Subscriptions", body = [SubscriptionDto]))
)]
pub async fn list_subscriptions(
    State(state): State<AppState>,
    Query(params): Query<ListSubscriptionsParams>,
) -> ApiResult<Json<Vec<SubscriptionDto>>> {
    Ok(Json(
        state.subscriptions.list(params.limit.unwrap_or(0)).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/subscriptions/{id}",
    tag = "subscriptions",
    params(("id" = String, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Subscription", body = SubscriptionDto),
        (status = 404, description = "Not found", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SubscriptionDto>> {
    Ok(Json(state.subscriptions.get(&id).await?))
}

#[utoipa::path(
    put,
    path = "/subscriptions/{id}",
    tag = "subscriptions",
    params(("id" = String, Path, description = "Subscription ID")),
    request_body = UpdateSubscriptionRequest,
    responses(
        (status = 200, description = "Updated subscription", body = SubscriptionDto),
        (status = 404, description = "Not found", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn update_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateSubscriptionRequest>,
) -> ApiResult<Json<SubscriptionDto>> {
    Ok(Json(state.subscriptions.update(&id, req).await?))
}

#[utoipa::path(
    delete,
    path = "/subscriptions/{id}",
    tag = "subscriptions",
    params(("id" = String, Path, description = "Subscription ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn delete_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.subscriptions.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/subscriptions/{id}/sync",
    tag = "subscriptions",
    params(("id" = String, Path, description = "Subscription ID"), SyncParams),
    responses(
        (status = 200, description = "Sync outcome", body = SyncResult),
        (status = 404, description = "Not found", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn sync_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SyncParams>,
) -> ApiResult<Json<SyncResult>> {
    let result = state
        .subscriptions
        .sync_once(&id, params.enqueue.unwrap_or(true))
        .await?;
    Ok(Json(result))
}
