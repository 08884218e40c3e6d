//! Broker connection settings loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

use soilwatch_core::env::{parse_or, string_or};

use crate::reconnect::ReconnectConfig;
use crate::tls::TlsMaterialPaths;

/// How long `publish_command` waits for the broker's PUBACK.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for each shutdown step (unsubscribe, disconnect, task join).
pub const DEFAULT_DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Everything needed to reach the broker and route device traffic.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    /// Topic the devices publish readings on.
    pub telemetry_topic: String,
    /// Topic actuator commands are forwarded to.
    pub command_topic: String,
    /// Mutual-TLS material; `None` connects over plain TCP.
    pub tls: Option<TlsMaterialPaths>,
    pub reconnect: ReconnectConfig,
    pub publish_timeout: Duration,
    pub disconnect_grace: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".into(),
            port: 1883,
            client_id: "soilwatch-backend".into(),
            telemetry_topic: "esp32/sensors".into(),
            command_topic: "esp32/actuator".into(),
            tls: None,
            reconnect: ReconnectConfig::default(),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            disconnect_grace: DEFAULT_DISCONNECT_GRACE,
        }
    }
}

impl MqttConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env var              | Default              |
    /// |----------------------|----------------------|
    /// | `MQTT_BROKER`        | `localhost`          |
    /// | `MQTT_PORT`          | `1883`               |
    /// | `MQTT_CLIENT_ID`     | `soilwatch-backend`  |
    /// | `MQTT_TOPIC`         | `esp32/sensors`      |
    /// | `MQTT_COMMAND_TOPIC` | `esp32/actuator`     |
    /// | `MQTT_USE_TLS`       | `false`              |
    /// | `MQTT_CA_FILE`       | `./certs/ca.crt`     |
    /// | `MQTT_CERT_FILE`     | `./certs/client.crt` |
    /// | `MQTT_KEY_FILE`      | `./certs/client.key` |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let tls = parse_or("MQTT_USE_TLS", false).then(|| TlsMaterialPaths {
            ca_file: PathBuf::from(string_or("MQTT_CA_FILE", "./certs/ca.crt")),
            cert_file: PathBuf::from(string_or("MQTT_CERT_FILE", "./certs/client.crt")),
            key_file: PathBuf::from(string_or("MQTT_KEY_FILE", "./certs/client.key")),
        });

        Self {
            broker: string_or("MQTT_BROKER", &defaults.broker),
            port: parse_or("MQTT_PORT", defaults.port),
            client_id: string_or("MQTT_CLIENT_ID", &defaults.client_id),
            telemetry_topic: string_or("MQTT_TOPIC", &defaults.telemetry_topic),
            command_topic: string_or("MQTT_COMMAND_TOPIC", &defaults.command_topic),
            tls,
            ..defaults
        }
    }

    pub fn uses_tls(&self) -> bool {
        self.tls.is_some()
    }
}
