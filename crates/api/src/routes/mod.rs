//! Route tree. Everything is mounted at the root:
//!
//! ```text
//! GET  /health         service, database and broker health
//! GET  /data-streams   live readings (Server-Sent Events)
//! POST /actuator       forward a JSON command to the device
//! GET  /analytics      trailing 24 h history and summary stats
//! ```

pub mod actuator;
pub mod analytics;
pub mod health;
pub mod streams;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(streams::router())
        .merge(actuator::router())
        .merge(analytics::router())
}
