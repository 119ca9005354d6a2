//! Server-sent events: a live, best-effort stream of bus events.
//!
//! No retention: subscribers only see events published while attached.
//! Slow consumers lose events rather than backpressuring the engine.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::Stream;

use crate::api::server::AppState;

const HEARTBEAT: Duration = Duration::from_secs(15);

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(events))
}

#[utoipa::path(
    get,
    path = "/events",
    tag = "events",
    responses((status = 200, description = "SSE stream of bus events"))
)]
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.bus.subscribe();

    let stream = futures::stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.recv().await?;
        let sse_event = Event::default()
            .event(event.topic)
            .data(event.payload.to_string());
        Some((Ok(sse_event), subscription))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT))
}
