//! In-memory fakes for the broker session and ingestion collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use soilwatch_core::alert::{AlertConfig, AlertEngine};
use soilwatch_core::clock::ManualClock;
use soilwatch_core::error::CoreError;
use soilwatch_core::notify::Notifier;
use soilwatch_core::reading::Reading;
use soilwatch_core::sink::ReadingSink;
use soilwatch_core::types::Timestamp;
use soilwatch_events::buffer::{DistributionBuffer, DEFAULT_CAPACITY};
use tokio::sync::{mpsc, oneshot};

use crate::processor::Ingestor;
use crate::session::{EventSource, MqttSession, SessionError, TransportEvent};

pub fn start_time() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

#[derive(Default)]
pub struct MemorySink {
    pub rows: Mutex<Vec<Reading>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl ReadingSink for MemorySink {
    async fn append(&self, reading: &Reading) -> Result<(), CoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::Persistence("database unavailable".into()));
        }
        self.rows.lock().unwrap().push(reading.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryNotifier {
    pub sent: Mutex<Vec<String>>,
    /// Simulated delivery round-trip.
    pub delay: Mutex<Duration>,
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send_text(&self, text: &str) -> Result<(), CoreError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// An ingestor wired to in-memory collaborators.
pub struct Harness {
    pub ingestor: Arc<Ingestor>,
    pub sink: Arc<MemorySink>,
    pub notifier: Arc<MemoryNotifier>,
    pub clock: Arc<ManualClock>,
    pub buffer: Arc<DistributionBuffer>,
}

pub fn harness() -> Harness {
    let sink = Arc::new(MemorySink::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let clock = Arc::new(ManualClock::new(start_time()));
    let buffer = DistributionBuffer::new(DEFAULT_CAPACITY);
    let alerts = Arc::new(AlertEngine::new(
        AlertConfig::default(),
        notifier.clone(),
        clock.clone(),
    ));
    let ingestor = Arc::new(Ingestor::new(
        sink.clone(),
        alerts,
        buffer.clone(),
        clock.clone(),
    ));

    Harness {
        ingestor,
        sink,
        notifier,
        clock,
        buffer,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    Ack,
    Fail,
    Hang,
}

/// Records every request; behaviour of `subscribe` and `publish` is
/// switchable per test.
pub struct FakeSession {
    pub subscribes: Mutex<Vec<String>>,
    pub publishes: Mutex<Vec<(String, Vec<u8>)>>,
    pub unsubscribes: Mutex<Vec<String>>,
    pub disconnects: Mutex<u32>,
    pub fail_subscribe: AtomicBool,
    pub publish_mode: Mutex<PublishMode>,
    /// Emits a connection error once `disconnect` is called.
    pub on_disconnect: Mutex<Option<mpsc::UnboundedSender<Result<TransportEvent, SessionError>>>>,
}

impl FakeSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribes: Mutex::default(),
            publishes: Mutex::default(),
            unsubscribes: Mutex::default(),
            disconnects: Mutex::new(0),
            fail_subscribe: AtomicBool::new(false),
            publish_mode: Mutex::new(PublishMode::Ack),
            on_disconnect: Mutex::new(None),
        })
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribes.lock().unwrap().len()
    }

    pub fn publish_count(&self) -> usize {
        self.publishes.lock().unwrap().len()
    }
}

#[async_trait]
impl MqttSession for FakeSession {
    async fn subscribe(&self, topic: &str) -> Result<(), SessionError> {
        self.subscribes.lock().unwrap().push(topic.to_string());
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(SessionError::Request("not authorized".into()));
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), SessionError> {
        self.publishes
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        let mode = *self.publish_mode.lock().unwrap();
        match mode {
            PublishMode::Ack => Ok(()),
            PublishMode::Fail => Err(SessionError::AckLost),
            PublishMode::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), SessionError> {
        self.unsubscribes.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        *self.disconnects.lock().unwrap() += 1;
        if let Some(tx) = self.on_disconnect.lock().unwrap().take() {
            let _ = tx.send(Err(SessionError::Connection("disconnected".into())));
        }
        Ok(())
    }
}

/// Replays events pushed through a channel; waits forever once the
/// channel is empty and closed.
pub struct ScriptedEvents {
    rx: mpsc::UnboundedReceiver<Result<TransportEvent, SessionError>>,
}

pub fn scripted_events() -> (
    mpsc::UnboundedSender<Result<TransportEvent, SessionError>>,
    ScriptedEvents,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ScriptedEvents { rx })
}

#[async_trait]
impl EventSource for ScriptedEvents {
    async fn next_event(&mut self) -> Result<TransportEvent, SessionError> {
        match self.rx.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }
}

/// Like the rumqttc event loop: a publish is only acknowledged while
/// [`PolledAckEvents::next_event`] is being polled.
#[derive(Default)]
pub struct PolledAckSession {
    waiting: Mutex<Vec<oneshot::Sender<()>>>,
}

impl PolledAckSession {
    fn release_acks(&self) {
        for tx in self.waiting.lock().unwrap().drain(..) {
            let _ = tx.send(());
        }
    }
}

#[async_trait]
impl MqttSession for PolledAckSession {
    async fn subscribe(&self, _topic: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().unwrap().push(tx);
        rx.await.map_err(|_| SessionError::AckLost)
    }

    async fn unsubscribe(&self, _topic: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        Ok(())
    }
}

pub struct PolledAckEvents {
    rx: mpsc::UnboundedReceiver<Result<TransportEvent, SessionError>>,
    session: Arc<PolledAckSession>,
}

pub fn polled_ack_events(
    session: Arc<PolledAckSession>,
) -> (
    mpsc::UnboundedSender<Result<TransportEvent, SessionError>>,
    PolledAckEvents,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, PolledAckEvents { rx, session })
}

#[async_trait]
impl EventSource for PolledAckEvents {
    async fn next_event(&mut self) -> Result<TransportEvent, SessionError> {
        loop {
            self.session.release_acks();
            tokio::select! {
                event = self.rx.recv() => match event {
                    Some(event) => return event,
                    None => std::future::pending::<()>().await,
                },
                _ = tokio::time::sleep(Duration::from_millis(5)) => {}
            }
        }
    }
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
