//! Inbound telemetry handling.
//!
//! [`Ingestor::handle_payload`] is called by the ingestion task for every
//! inbound PUBLISH, strictly in arrival order. A decoded reading is
//! persisted, checked against the alert rules once, and offered to the
//! distribution buffer, in that order.

use std::sync::Arc;

use soilwatch_core::alert::AlertEngine;
use soilwatch_core::clock::Clock;
use soilwatch_core::sink::ReadingSink;
use soilwatch_events::buffer::{DistributionBuffer, OfferOutcome};

use crate::messages::{decode_reading, DecodeError};

pub struct Ingestor {
    sink: Arc<dyn ReadingSink>,
    alerts: Arc<AlertEngine>,
    buffer: Arc<DistributionBuffer>,
    clock: Arc<dyn Clock>,
}

impl Ingestor {
    pub fn new(
        sink: Arc<dyn ReadingSink>,
        alerts: Arc<AlertEngine>,
        buffer: Arc<DistributionBuffer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sink,
            alerts,
            buffer,
            clock,
        }
    }

    /// Process one inbound payload.
    ///
    /// Malformed payloads are logged and go nowhere else. Persistence and
    /// notification failures are logged and do not stop distribution.
    pub async fn handle_payload(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Result<OfferOutcome, DecodeError> {
        let reading = match decode_reading(payload, self.clock.now()) {
            Ok(reading) => reading,
            Err(e) => {
                tracing::warn!(
                    topic,
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "Dropping malformed telemetry payload"
                );
                return Err(e);
            }
        };

        tracing::debug!(
            topic,
            temperature = reading.temperature,
            humidity = reading.humidity,
            soil_moisture = reading.soil_moisture,
            pump_active = reading.pump_active,
            "Reading received"
        );

        if let Err(e) = self.sink.append(&reading).await {
            tracing::error!(error = %e, "Failed to persist reading");
        }

        self.alerts.evaluate(&reading).await;

        Ok(self.buffer.offer(reading))
    }
}
