use axum::body::Bytes;
use axum::extract::State;
use axum::{routing::post, Json, Router};
use soilwatch_core::command::validate_command;

use crate::error::AppResult;
use crate::response::CommandResponse;
use crate::state::AppState;

/// POST /actuator
///
/// The body must be syntactically valid JSON; it is forwarded to the
/// device byte-for-byte. Invalid bodies never reach the broker.
async fn send_command(State(state): State<AppState>, body: Bytes) -> AppResult<Json<CommandResponse>> {
    validate_command(&body)?;
    state.mqtt.publish_command(body.to_vec()).await?;
    Ok(Json(CommandResponse::sent()))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/actuator", post(send_command))
}
