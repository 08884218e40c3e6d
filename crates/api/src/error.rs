use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use soilwatch_core::error::CoreError;
use soilwatch_mqtt::MqttClientError;

/// Message returned for every failed command hand-off.
const COMMAND_FAILED: &str = "Failed to send command to device";

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors, the broker client and the
/// database. Implements [`IntoResponse`] to produce the
/// `{ "success": false, "message": ..., "code": ... }` envelope.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `soilwatch_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The command could not be handed to the device.
    #[error(transparent)]
    Mqtt(#[from] MqttClientError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Persistence(msg) | CoreError::Notification(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            // --- Broker errors ---
            AppError::Mqtt(err) => {
                tracing::error!(error = %err, "Command publish failed");
                let code = match err {
                    MqttClientError::NotConnected => "MQTT_NOT_CONNECTED",
                    MqttClientError::Publish(_) => "MQTT_PUBLISH_FAILED",
                    _ => "MQTT_ERROR",
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    code,
                    COMMAND_FAILED.to_string(),
                )
            }

            // --- Database errors ---
            AppError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                internal()
            }
        };

        let body = json!({
            "success": false,
            "message": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
