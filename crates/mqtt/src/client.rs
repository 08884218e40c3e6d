//! Broker client: connection lifecycle, inbound dispatch, command publish.
//!
//! [`MqttClient::connect`] builds the `rumqttc` session, waits for the
//! first CONNACK and spawns two tasks. The event-loop task drives the
//! [`ConnectionMachine`], re-establishes the telemetry subscription whenever
//! the connection comes (back) up and hands inbound payloads to a queue.
//! The ingestion task drains that queue into the [`Ingestor`] in arrival
//! order. The event loop never waits on ingestion, so PUBACKs and pings keep
//! flowing while a reading is persisted or an alert is delivered. Lost
//! connections are retried forever at a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, MqttOptions};
use soilwatch_events::buffer::DistributionBuffer;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::MqttConfig;
use crate::processor::Ingestor;
use crate::reconnect::{ConnectionMachine, ConnectionState};
use crate::session::{EventSource, MqttSession, PendingAcks, RumqttEvents, RumqttSession, TransportEvent};
use crate::tls::{load_tls_material, TlsError};

/// Capacity of the request channel between the client handle and the
/// event loop.
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Inbound payloads waiting for the ingestion task. When full, new
/// payloads are dropped rather than stalling the event loop.
const INGEST_QUEUE_CAPACITY: usize = 1024;

/// One inbound PUBLISH: topic and raw payload.
type InboundMessage = (String, Vec<u8>);

/// Errors surfaced by the broker client.
#[derive(Debug, thiserror::Error)]
pub enum MqttClientError {
    /// The initial connection could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// TLS material could not be read or parsed.
    #[error("TLS configuration error: {0}")]
    TlsConfig(#[from] TlsError),

    /// The telemetry subscription was refused. Logged, never fatal.
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// A command was submitted while the broker is unreachable.
    #[error("MQTT client not connected")]
    NotConnected,

    /// The broker did not acknowledge a command.
    #[error("Publish error: {0}")]
    Publish(String),
}

/// Shared handle to the broker connection.
pub struct MqttClient {
    session: Arc<dyn MqttSession>,
    machine: Arc<ConnectionMachine>,
    config: MqttConfig,
    buffer: Arc<DistributionBuffer>,
    cancel: CancellationToken,
    /// Event-loop task first, then the ingestion task.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MqttClient {
    /// Connect to the configured broker and start consuming telemetry.
    ///
    /// Fails if the TLS material is unusable or the broker does not accept
    /// the connection within the connect timeout.
    pub async fn connect(
        config: MqttConfig,
        ingestor: Arc<Ingestor>,
        buffer: Arc<DistributionBuffer>,
    ) -> Result<Arc<Self>, MqttClientError> {
        let options = build_options(&config)?;
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        let acks = Arc::new(PendingAcks::default());
        let session = Arc::new(RumqttSession::new(client, Arc::clone(&acks)));
        let events = RumqttEvents::new(eventloop, acks);

        tracing::info!(
            broker = %config.broker,
            port = config.port,
            client_id = %config.client_id,
            tls = config.uses_tls(),
            "Connecting to MQTT broker"
        );

        Self::start(config, session, events, ingestor, buffer).await
    }

    /// Start on an already-built session. [`connect`](Self::connect) is
    /// the production entry point; this is the seam for other transports.
    pub async fn start<E>(
        config: MqttConfig,
        session: Arc<dyn MqttSession>,
        mut events: E,
        ingestor: Arc<Ingestor>,
        buffer: Arc<DistributionBuffer>,
    ) -> Result<Arc<Self>, MqttClientError>
    where
        E: EventSource + 'static,
    {
        let machine = Arc::new(ConnectionMachine::new());
        machine.on_connecting();

        let connect_timeout = config.reconnect.connect_timeout;
        match tokio::time::timeout(connect_timeout, events.next_event()).await {
            Ok(Ok(TransportEvent::Connected)) => {}
            Ok(Ok(other)) => {
                return Err(MqttClientError::Connection(format!(
                    "Unexpected event before CONNACK: {other:?}"
                )));
            }
            Ok(Err(e)) => return Err(MqttClientError::Connection(e.to_string())),
            Err(_) => {
                return Err(MqttClientError::Connection(format!(
                    "No CONNACK within {connect_timeout:?}"
                )));
            }
        }

        tracing::info!(broker = %config.broker, "MQTT connected");
        if machine.on_connected() {
            subscribe_telemetry(session.as_ref(), &config.telemetry_topic).await;
        }

        let cancel = CancellationToken::new();
        let (inbound_tx, inbound_rx) = mpsc::channel(INGEST_QUEUE_CAPACITY);
        let event_loop = tokio::spawn(run_event_loop(
            events,
            Arc::clone(&session),
            Arc::clone(&machine),
            inbound_tx,
            config.telemetry_topic.clone(),
            config.reconnect.retry_interval,
            cancel.clone(),
        ));
        let ingestion = tokio::spawn(run_ingestion(inbound_rx, ingestor, cancel.clone()));

        Ok(Arc::new(Self {
            session,
            machine,
            config,
            buffer,
            cancel,
            tasks: Mutex::new(vec![event_loop, ingestion]),
        }))
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receiver that observes every connection state change.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.machine.watch()
    }

    /// Publish `payload` verbatim to the command topic and wait for the
    /// broker's acknowledgement.
    pub async fn publish_command(&self, payload: Vec<u8>) -> Result<(), MqttClientError> {
        if !self.is_connected() {
            return Err(MqttClientError::NotConnected);
        }

        let topic = &self.config.command_topic;
        let size = payload.len();

        match tokio::time::timeout(
            self.config.publish_timeout,
            self.session.publish(topic, payload),
        )
        .await
        {
            Ok(Ok(())) => {
                tracing::info!(topic = %topic, bytes = size, "Command published");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::warn!(topic = %topic, error = %e, "Command publish failed");
                Err(MqttClientError::Publish(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(topic = %topic, "Command publish timed out");
                Err(MqttClientError::Publish(format!(
                    "No acknowledgement within {:?}",
                    self.config.publish_timeout
                )))
            }
        }
    }

    /// Unsubscribe, disconnect, stop both tasks and close the buffer.
    ///
    /// Every step is bounded by the disconnect grace period. Safe to call
    /// more than once.
    pub async fn shutdown(&self) {
        if !self.machine.begin_shutdown() {
            return;
        }
        tracing::info!("Shutting down MQTT client");

        let grace = self.config.disconnect_grace;
        let topic = &self.config.telemetry_topic;

        match tokio::time::timeout(grace, self.session.unsubscribe(topic)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(topic = %topic, error = %e, "Unsubscribe failed"),
            Err(_) => tracing::warn!(topic = %topic, "Unsubscribe timed out"),
        }

        match tokio::time::timeout(grace, self.session.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Disconnect failed"),
            Err(_) => tracing::warn!("Disconnect timed out"),
        }

        // The event loop gets a chance to flush the DISCONNECT; once it exits
        // the ingestion queue closes and drains.
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for mut task in tasks {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                self.cancel.cancel();
                let _ = task.await;
            }
        }
        self.cancel.cancel();

        self.buffer.close();
        tracing::info!("MQTT client shut down");
    }
}

fn build_options(config: &MqttConfig) -> Result<MqttOptions, MqttClientError> {
    let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
    options.set_keep_alive(config.reconnect.keep_alive);
    options.set_clean_session(true);

    if let Some(paths) = &config.tls {
        let material = load_tls_material(paths)?;
        options.set_transport(material.into_transport());
    }

    Ok(options)
}

async fn subscribe_telemetry(session: &dyn MqttSession, topic: &str) {
    match session.subscribe(topic).await {
        Ok(()) => tracing::info!(topic, "Subscribed to telemetry"),
        Err(e) => {
            let err = MqttClientError::Subscription(e.to_string());
            tracing::error!(topic, error = %err, "Telemetry subscription failed");
        }
    }
}

/// Event-loop task: runs until cancelled or until the connection closes
/// during shutdown.
async fn run_event_loop<E: EventSource>(
    mut events: E,
    session: Arc<dyn MqttSession>,
    machine: Arc<ConnectionMachine>,
    inbound: mpsc::Sender<InboundMessage>,
    telemetry_topic: String,
    retry_interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.next_event() => event,
        };

        match event {
            Ok(TransportEvent::Connected) => {
                if machine.on_connected() {
                    tracing::info!("MQTT reconnected");
                    subscribe_telemetry(session.as_ref(), &telemetry_topic).await;
                }
            }
            Ok(TransportEvent::Message { topic, payload }) => {
                match inbound.try_send((topic, payload)) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full((topic, _))) => {
                        tracing::warn!(topic = %topic, "Ingestion queue full, dropping payload");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            Ok(TransportEvent::SubscribeRejected) => {
                let err = MqttClientError::Subscription(format!(
                    "broker rejected subscription to {telemetry_topic}"
                ));
                tracing::error!(error = %err, "Telemetry subscription failed");
            }
            Err(e) => {
                if machine.state() == ConnectionState::ShuttingDown {
                    break;
                }
                if machine.on_connection_lost() {
                    tracing::warn!(error = %e, "MQTT connection lost");
                } else {
                    tracing::warn!(error = %e, "MQTT reconnect attempt failed");
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(retry_interval) => {}
                }
                machine.on_connecting();
            }
        }
    }

    tracing::debug!("MQTT event loop exited");
}

/// Ingestion task: handles queued payloads one at a time until the event
/// loop drops its sender or the client is cancelled.
async fn run_ingestion(
    mut inbound: mpsc::Receiver<InboundMessage>,
    ingestor: Arc<Ingestor>,
    cancel: CancellationToken,
) {
    loop {
        let (topic, payload) = tokio::select! {
            _ = cancel.cancelled() => break,
            message = inbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        let _ = ingestor.handle_payload(&topic, &payload).await;
    }

    tracing::debug!("Ingestion task exited");
}
