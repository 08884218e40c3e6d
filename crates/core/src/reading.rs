//! The decoded telemetry sample that flows through the pipeline.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// One telemetry sample from the sensor device.
///
/// Built once at the ingestion boundary and never mutated afterwards. The
/// persistence sink and the distribution buffer each receive their own
/// copy, so there is no shared mutable ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Air temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative air humidity in percent.
    pub humidity: f64,
    /// Raw soil moisture sensor value. Higher means drier soil.
    pub soil_moisture: i32,
    /// Whether the watering pump was running when the sample was taken.
    pub pump_active: bool,
    /// When the reading was accepted by the ingestion boundary.
    pub observed_at: Timestamp,
}
