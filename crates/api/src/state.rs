use std::sync::Arc;

use soilwatch_events::DistributionBuffer;
use soilwatch_mqtt::MqttClient;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: everything is behind an `Arc` or is a pool handle.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: soilwatch_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Live readings fan-out; one subscription per SSE viewer.
    pub buffer: Arc<DistributionBuffer>,
    /// Broker connection used to forward actuator commands.
    pub mqtt: Arc<MqttClient>,
}
