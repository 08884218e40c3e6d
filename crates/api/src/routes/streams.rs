//! Live readings over Server-Sent Events.
//!
//! Each request takes its own buffer subscription and receives every
//! reading from then on as a `data:` event carrying the JSON reading.
//! Dropping the connection drops the subscription, which deregisters the
//! viewer. The stream ends when the buffer is closed at shutdown.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::header::CACHE_CONTROL;
use axum::http::HeaderName;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::{routing::get, Router};
use futures::StreamExt;

use crate::state::AppState;

/// GET /data-streams
async fn data_streams(State(state): State<AppState>) -> impl IntoResponse {
    let subscription = state.buffer.subscribe();
    tracing::info!(viewer_id = %subscription.id(), "SSE client connected");

    let events = subscription.filter_map(|reading| async move {
        match Event::default().json_data(&reading) {
            Ok(event) => Some(Ok::<_, Infallible>(event)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode reading");
                None
            }
        }
    });

    let keep_alive =
        KeepAlive::new().interval(Duration::from_secs(state.config.sse_keep_alive_secs));

    (
        [
            (CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events).keep_alive(keep_alive),
    )
}

pub fn router() -> Router<AppState> {
    Router::new().route("/data-streams", get(data_streams))
}
