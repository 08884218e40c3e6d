//! Repository for the `sensor_readings` table (append-only time-series).

use soilwatch_core::reading::Reading;
use soilwatch_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::reading::{HistoryPoint, ReadingStats, StoredReading};

/// Column list for `sensor_readings` SELECT queries.
const COLUMNS: &str = "\
    id, temperature, humidity, soil_moisture, pump_active, observed_at, created_at";

/// Provides query operations for sensor readings.
pub struct ReadingRepo;

impl ReadingRepo {
    /// Append a single reading, returning the generated ID.
    pub async fn insert(pool: &PgPool, reading: &Reading) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO sensor_readings \
                (temperature, humidity, soil_moisture, pump_active, observed_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(reading.soil_moisture)
        .bind(reading.pump_active)
        .bind(reading.observed_at)
        .fetch_one(pool)
        .await
    }

    /// Most recent readings first.
    pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<StoredReading>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sensor_readings \
             ORDER BY observed_at DESC, id DESC \
             LIMIT $1"
        );
        sqlx::query_as::<_, StoredReading>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Per-minute averages for readings observed at or after `since`,
    /// oldest bucket first.
    pub async fn history_since(
        pool: &PgPool,
        since: Timestamp,
    ) -> Result<Vec<HistoryPoint>, sqlx::Error> {
        sqlx::query_as::<_, HistoryPoint>(
            "SELECT \
                date_trunc('minute', observed_at) AS time, \
                AVG(temperature)::float8 AS temperature, \
                AVG(humidity)::float8 AS humidity, \
                AVG(soil_moisture)::float8 AS soil_moisture \
             FROM sensor_readings \
             WHERE observed_at >= $1 \
             GROUP BY 1 \
             ORDER BY 1 ASC",
        )
        .bind(since)
        .fetch_all(pool)
        .await
    }

    /// Averages and pump activation count for readings observed at or
    /// after `since`. An empty window yields zeros.
    pub async fn stats_since(pool: &PgPool, since: Timestamp) -> Result<ReadingStats, sqlx::Error> {
        sqlx::query_as::<_, ReadingStats>(
            "SELECT \
                COALESCE(AVG(temperature), 0)::float8 AS avg_temp, \
                COALESCE(AVG(humidity), 0)::float8 AS avg_humidity, \
                COALESCE(AVG(soil_moisture), 0)::float8 AS avg_moisture, \
                COUNT(*) FILTER (WHERE pump_active) AS pump_activations \
             FROM sensor_readings \
             WHERE observed_at >= $1",
        )
        .bind(since)
        .fetch_one(pool)
        .await
    }
}
