//! Sensor reading rows and trailing-window aggregates.

use serde::Serialize;
use soilwatch_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A persisted reading as stored in `sensor_readings`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StoredReading {
    pub id: DbId,
    pub temperature: f64,
    pub humidity: f64,
    pub soil_moisture: i32,
    pub pump_active: bool,
    pub observed_at: Timestamp,
    pub created_at: Timestamp,
}

/// Per-minute averages used by the analytics chart.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct HistoryPoint {
    pub time: Timestamp,
    pub temperature: f64,
    pub humidity: f64,
    pub soil_moisture: f64,
}

/// Summary statistics over a trailing window.
#[derive(Debug, Clone, Default, FromRow, Serialize)]
pub struct ReadingStats {
    pub avg_temp: f64,
    pub avg_humidity: f64,
    pub avg_moisture: f64,
    /// Number of readings that reported the pump as running.
    pub pump_activations: i64,
}
