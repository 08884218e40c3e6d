//! Broker session seams and their `rumqttc` implementation.
//!
//! The client talks to the broker through two traits:
//!
//! - [`MqttSession`]: requests that originate on our side (subscribe,
//!   publish with acknowledgement, unsubscribe, disconnect).
//! - [`EventSource`]: connection-level events coming from the broker.
//!
//! [`RumqttSession`] and [`RumqttEvents`] share a [`PendingAcks`] table so a
//! publish can wait for its PUBACK. MQTT 3.1.1 does not hand the packet id
//! back to the caller, so waiters are queued in request order and bound to
//! a packet id when the event loop reports the outgoing PUBLISH.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, QoS, SubscribeReasonCode};
use tokio::sync::oneshot;

/// Connection-level event surfaced to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// CONNACK received; the session is usable.
    Connected,
    /// Inbound PUBLISH.
    Message { topic: String, payload: Vec<u8> },
    /// The broker answered a SUBSCRIBE with a failure return code.
    SubscribeRejected,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The request could not be handed to the connection.
    #[error("Request failed: {0}")]
    Request(String),

    /// The connection dropped before the broker acknowledged.
    #[error("Connection lost before acknowledgement")]
    AckLost,

    /// The connection itself failed.
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Outbound side of a broker session.
#[async_trait]
pub trait MqttSession: Send + Sync {
    /// Request a QoS 1 subscription. Must not wait on the event loop.
    async fn subscribe(&self, topic: &str) -> Result<(), SessionError>;

    /// Publish at QoS 1 and resolve once the broker's PUBACK arrives.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), SessionError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), SessionError>;

    async fn disconnect(&self) -> Result<(), SessionError>;
}

/// Inbound side of a broker session.
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next relevant event. An `Err` means the connection
    /// dropped or a connection attempt failed; calling again retries.
    async fn next_event(&mut self) -> Result<TransportEvent, SessionError>;
}

// ---------------------------------------------------------------------------
// PendingAcks
// ---------------------------------------------------------------------------

type AckSender = oneshot::Sender<Result<(), SessionError>>;

#[derive(Default)]
struct AckTable {
    /// Requested but not yet written to the wire, in request order. Failed
    /// entries stay as `None` so later packet ids still line up.
    queued: VecDeque<Option<AckSender>>,
    /// Written to the wire, keyed by packet id.
    in_flight: HashMap<u16, AckSender>,
}

/// Waiters for QoS 1 publish acknowledgements.
#[derive(Default)]
pub struct PendingAcks {
    table: Mutex<AckTable>,
}

impl PendingAcks {
    fn lock(&self) -> MutexGuard<'_, AckTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a waiter for the next outgoing PUBLISH.
    fn enqueue(&self) -> oneshot::Receiver<Result<(), SessionError>> {
        let (tx, rx) = oneshot::channel();
        self.lock().queued.push_back(Some(tx));
        rx
    }

    /// Undo the most recent [`enqueue`](Self::enqueue) after the request
    /// never reached the event loop.
    fn cancel_last(&self) {
        self.lock().queued.pop_back();
    }

    /// The event loop wrote a PUBLISH with `pkid`.
    fn assign(&self, pkid: u16) {
        let mut table = self.lock();
        if table.in_flight.contains_key(&pkid) {
            return;
        }
        if let Some(Some(tx)) = table.queued.pop_front() {
            table.in_flight.insert(pkid, tx);
        }
    }

    /// PUBACK received for `pkid`.
    fn resolve(&self, pkid: u16) {
        if let Some(tx) = self.lock().in_flight.remove(&pkid) {
            let _ = tx.send(Ok(()));
        }
    }

    /// The connection dropped; every waiter fails.
    fn fail_all(&self) {
        let mut table = self.lock();
        for (_, tx) in table.in_flight.drain() {
            let _ = tx.send(Err(SessionError::AckLost));
        }
        for slot in table.queued.iter_mut() {
            if let Some(tx) = slot.take() {
                let _ = tx.send(Err(SessionError::AckLost));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// rumqttc adapter
// ---------------------------------------------------------------------------

/// [`MqttSession`] over a `rumqttc::AsyncClient`.
pub struct RumqttSession {
    client: AsyncClient,
    acks: Arc<PendingAcks>,
    /// Keeps waiter order equal to request order.
    publish_lock: tokio::sync::Mutex<()>,
}

impl RumqttSession {
    pub fn new(client: AsyncClient, acks: Arc<PendingAcks>) -> Self {
        Self {
            client,
            acks,
            publish_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl MqttSession for RumqttSession {
    async fn subscribe(&self, topic: &str) -> Result<(), SessionError> {
        // Called from the event-loop task, so it must not wait for the
        // request channel to drain.
        self.client
            .try_subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| SessionError::Request(e.to_string()))
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), SessionError> {
        let ack = {
            let _guard = self.publish_lock.lock().await;
            let ack = self.acks.enqueue();
            if let Err(e) = self
                .client
                .publish(topic, QoS::AtLeastOnce, false, payload)
                .await
            {
                self.acks.cancel_last();
                return Err(SessionError::Request(e.to_string()));
            }
            ack
        };

        ack.await.unwrap_or(Err(SessionError::AckLost))
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), SessionError> {
        self.client
            .try_unsubscribe(topic)
            .map_err(|e| SessionError::Request(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        self.client
            .try_disconnect()
            .map_err(|e| SessionError::Request(e.to_string()))
    }
}

/// [`EventSource`] over a `rumqttc::EventLoop`.
pub struct RumqttEvents {
    eventloop: EventLoop,
    acks: Arc<PendingAcks>,
}

impl RumqttEvents {
    pub fn new(eventloop: EventLoop, acks: Arc<PendingAcks>) -> Self {
        Self { eventloop, acks }
    }
}

#[async_trait]
impl EventSource for RumqttEvents {
    async fn next_event(&mut self) -> Result<TransportEvent, SessionError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(TransportEvent::Connected),
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(TransportEvent::Message {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    });
                }
                Ok(Event::Incoming(Packet::PubAck(ack))) => self.acks.resolve(ack.pkid),
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        return Ok(TransportEvent::SubscribeRejected);
                    }
                }
                Ok(Event::Outgoing(Outgoing::Publish(pkid))) => self.acks.assign(pkid),
                Ok(_) => {}
                Err(e) => {
                    self.acks.fail_all();
                    return Err(SessionError::Connection(e.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn ack_resolves_waiter_bound_to_pkid() {
        let acks = PendingAcks::default();
        let first = acks.enqueue();
        let second = acks.enqueue();

        acks.assign(7);
        acks.assign(8);
        acks.resolve(8);
        acks.resolve(7);

        assert_matches!(first.await, Ok(Ok(())));
        assert_matches!(second.await, Ok(Ok(())));
    }

    #[tokio::test]
    async fn connection_loss_fails_every_waiter() {
        let acks = PendingAcks::default();
        let in_flight = acks.enqueue();
        let queued = acks.enqueue();
        acks.assign(1);

        acks.fail_all();

        assert_matches!(in_flight.await, Ok(Err(SessionError::AckLost)));
        assert_matches!(queued.await, Ok(Err(SessionError::AckLost)));
    }

    #[tokio::test]
    async fn failed_queued_slot_still_consumes_its_pkid() {
        let acks = PendingAcks::default();
        let stale = acks.enqueue();
        acks.fail_all();
        let fresh = acks.enqueue();

        // The stale request is written first after reconnect.
        acks.assign(3);
        acks.assign(4);
        acks.resolve(3);
        acks.resolve(4);

        assert_matches!(stale.await, Ok(Err(SessionError::AckLost)));
        assert_matches!(fresh.await, Ok(Ok(())));
    }

    #[test]
    fn cancel_last_removes_unsent_waiter() {
        let acks = PendingAcks::default();
        let _rx = acks.enqueue();
        acks.cancel_last();
        assert!(acks.lock().queued.is_empty());
    }
}
