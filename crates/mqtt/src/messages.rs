//! Telemetry payload decoding.
//!
//! Devices publish JSON objects of the shape
//! `{"temperature": 24.1, "humidity": 55.0, "soil_moisture": 2870, "pump_active": false}`.
//! Older firmware names the pump flag `water_pump`; when a payload carries
//! both, `pump_active` wins. Unknown fields are ignored.

use serde::Deserialize;
use serde_json::Value;
use soilwatch_core::reading::Reading;
use soilwatch_core::types::Timestamp;

#[derive(Debug, Deserialize)]
struct TelemetryPayload {
    temperature: f64,
    humidity: f64,
    soil_moisture: i32,
    pump_active: Option<bool>,
    water_pump: Option<bool>,
}

/// A payload that could not be turned into a [`Reading`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid telemetry payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON, but not an object.
    #[error("Invalid telemetry payload: expected a JSON object")]
    NotAnObject,

    #[error("Invalid telemetry payload: missing field `pump_active`")]
    MissingPumpState,
}

/// Decode one payload, stamping it with `observed_at`.
///
/// Any timestamp inside the payload is ignored.
pub fn decode_reading(payload: &[u8], observed_at: Timestamp) -> Result<Reading, DecodeError> {
    // Derived struct deserializers also accept sequences; only objects are
    // valid telemetry.
    let value: Value = serde_json::from_slice(payload)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }

    let raw: TelemetryPayload = serde_json::from_value(value)?;
    let pump_active = raw
        .pump_active
        .or(raw.water_pump)
        .ok_or(DecodeError::MissingPumpState)?;

    Ok(Reading {
        temperature: raw.temperature,
        humidity: raw.humidity,
        soil_moisture: raw.soil_moisture,
        pump_active,
        observed_at,
    })
}
