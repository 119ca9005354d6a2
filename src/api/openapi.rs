//! OpenAPI document.

use utoipa::OpenApi;

use crate::api::error::ApiErrorResponse;
use crate::api::routes;
use crate::jobs::{CreateJobRequest, JobDto};
use crate::subscriptions::{
    CreateSubscriptionRequest, SubscriptionDto, SyncResult, UpdateSubscriptionRequest,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "asd-server API",
        description = "Anime-sama subscription tracker and episode download service"
    ),
    paths(
        routes::jobs::create_job,
        routes::jobs::list_jobs,
        routes::jobs::get_job,
        routes::jobs::cancel_job,
        routes::subscriptions::create_subscription,
        routes::subscriptions::list_subscriptions,
        routes::subscriptions::get_subscription,
        routes::subscriptions::update_subscription,
        routes::subscriptions::delete_subscription,
        routes::subscriptions::sync_subscription,
        routes::settings::get_settings,
        routes::settings::put_settings,
        routes::events::events,
        routes::health::health,
    ),
    components(schemas(
        JobDto,
        CreateJobRequest,
        SubscriptionDto,
        CreateSubscriptionRequest,
        UpdateSubscriptionRequest,
        SyncResult,
        ApiErrorResponse,
    )),
    tags(
        (name = "jobs", description = "Job queue"),
        (name = "subscriptions", description = "Tracked series"),
        (name = "settings", description = "Process-wide configuration"),
        (name = "events", description = "Live event stream"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;
