//! Connection lifecycle and retry timing for the broker connection.
//!
//! [`ConnectionMachine`] tracks the lifecycle as an explicit state and
//! publishes every change through a [`watch`] channel. The event-loop task
//! drives the transitions; request handlers only read the current state.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected -> Connecting -> ...
//!        \______________\____________\_________> ShuttingDown (terminal)
//! ```

use std::time::Duration;

use tokio::sync::watch;

/// Retry and keep-alive timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Fixed delay between reconnect attempts.
    pub retry_interval: Duration,
    /// MQTT keep-alive interval.
    pub keep_alive: Duration,
    /// How long the initial connect may take before startup fails.
    pub connect_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(5),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ShuttingDown,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of the connection state.
pub struct ConnectionMachine {
    tx: watch::Sender<ConnectionState>,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self { tx }
    }

    pub fn state(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// A connection attempt is starting.
    pub fn on_connecting(&self) {
        self.transition(|state| match state {
            ConnectionState::Disconnected => Some(ConnectionState::Connecting),
            _ => None,
        });
    }

    /// The broker accepted the connection.
    ///
    /// Returns `true` only when this entered `Connected` from a
    /// not-connected state, i.e. when the telemetry subscription must be
    /// (re)established.
    pub fn on_connected(&self) -> bool {
        self.transition(|state| match state {
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                Some(ConnectionState::Connected)
            }
            _ => None,
        })
    }

    /// The connection dropped or an attempt failed.
    ///
    /// Returns `true` when an established connection was lost.
    pub fn on_connection_lost(&self) -> bool {
        let was_connected = self.state() == ConnectionState::Connected;
        let changed = self.transition(|state| match state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                Some(ConnectionState::Disconnected)
            }
            _ => None,
        });
        changed && was_connected
    }

    /// Enter the terminal state. Returns `false` if already shutting down.
    pub fn begin_shutdown(&self) -> bool {
        self.transition(|state| match state {
            ConnectionState::ShuttingDown => None,
            _ => Some(ConnectionState::ShuttingDown),
        })
    }

    fn transition(&self, next: impl FnOnce(ConnectionState) -> Option<ConnectionState>) -> bool {
        self.tx.send_if_modified(|state| match next(*state) {
            Some(new_state) => {
                tracing::debug!(from = %state, to = %new_state, "MQTT connection state changed");
                *state = new_state;
                true
            }
            None => false,
        })
    }
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}
