//! MQTT transport for SoilWatch devices.
//!
//! Connects to the broker (optionally over mutual TLS), keeps the
//! telemetry subscription alive across reconnects, decodes inbound
//! readings and hands them to the [`processor::Ingestor`], and publishes
//! actuator commands with acknowledgement.

pub mod client;
pub mod config;
pub mod messages;
pub mod processor;
pub mod reconnect;
pub mod session;
pub mod tls;

#[cfg(test)]
mod testing;

pub use client::{MqttClient, MqttClientError};
pub use config::MqttConfig;
pub use processor::Ingestor;
pub use reconnect::ConnectionState;
