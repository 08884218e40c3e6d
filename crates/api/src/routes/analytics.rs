use axum::extract::State;
use axum::{routing::get, Json, Router};
use chrono::{Duration, Utc};
use serde::Serialize;
use soilwatch_db::models::reading::{HistoryPoint, ReadingStats};
use soilwatch_db::repositories::ReadingRepo;

use crate::error::AppResult;
use crate::state::AppState;

/// Window covered by the analytics endpoint.
const ANALYTICS_WINDOW_HOURS: i64 = 24;

#[derive(Serialize)]
pub struct AnalyticsResponse {
    /// Per-minute averages, oldest first.
    pub historical_data: Vec<HistoryPoint>,
    pub stats: ReadingStats,
}

/// GET /analytics
async fn analytics(State(state): State<AppState>) -> AppResult<Json<AnalyticsResponse>> {
    let since = Utc::now() - Duration::hours(ANALYTICS_WINDOW_HOURS);

    let historical_data = ReadingRepo::history_since(&state.pool, since).await?;
    let stats = ReadingRepo::stats_since(&state.pool, since).await?;

    Ok(Json(AnalyticsResponse {
        historical_data,
        stats,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/analytics", get(analytics))
}
