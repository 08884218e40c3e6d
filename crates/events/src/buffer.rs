//! Bounded broadcast buffer between ingestion and live viewers.
//!
//! [`DistributionBuffer`] keeps a registry of per-viewer bounded queues. The
//! single producer pushes every reading into every registered queue with
//! `try_send`, so one slow viewer never holds up ingestion or other
//! viewers. When a queue is full the new reading is dropped for that viewer
//! only.
//!
//! Readings offered while nobody is watching are kept in a backlog of the
//! same capacity and handed to the next viewer that subscribes. Once the
//! backlog is full, further readings are dropped.
//!
//! Share it as `Arc<DistributionBuffer>`; [`Subscription`]s deregister
//! themselves when dropped.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use soilwatch_core::reading::Reading;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Default per-queue capacity.
pub const DEFAULT_CAPACITY: usize = 100;

/// Identifier assigned to each subscription.
pub type ViewerId = Uuid;

/// Result of offering one reading to the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferOutcome {
    /// Pushed to `viewers` queues; `dropped` queues were full.
    Delivered { viewers: usize, dropped: usize },
    /// No viewers; kept in the backlog for the next subscriber.
    Backlogged,
    /// No viewers and the backlog is full; the reading was discarded.
    Dropped,
    /// The buffer has been closed.
    Closed,
}

struct Registry {
    viewers: HashMap<ViewerId, mpsc::Sender<Reading>>,
    backlog: VecDeque<Reading>,
    closed: bool,
}

/// Fan-out buffer of decoded readings.
pub struct DistributionBuffer {
    capacity: usize,
    registry: Mutex<Registry>,
}

impl DistributionBuffer {
    /// Create a buffer whose queues each hold up to `capacity` readings.
    pub fn new(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        Arc::new(Self {
            capacity,
            registry: Mutex::new(Registry {
                viewers: HashMap::new(),
                backlog: VecDeque::with_capacity(capacity),
                closed: false,
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Offer a reading to every registered viewer. Never blocks.
    pub fn offer(&self, reading: Reading) -> OfferOutcome {
        let mut registry = self.lock();

        if registry.closed {
            tracing::debug!("Distribution buffer closed, discarding reading");
            return OfferOutcome::Closed;
        }

        if registry.viewers.is_empty() {
            if registry.backlog.len() >= self.capacity {
                tracing::warn!(
                    capacity = self.capacity,
                    "Distribution buffer full, dropping reading"
                );
                return OfferOutcome::Dropped;
            }
            registry.backlog.push_back(reading);
            return OfferOutcome::Backlogged;
        }

        let mut delivered = 0;
        let mut dropped = 0;
        let mut gone = Vec::new();

        for (id, sender) in &registry.viewers {
            match sender.try_send(reading.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    tracing::warn!(viewer_id = %id, "Viewer queue full, dropping reading");
                }
                Err(TrySendError::Closed(_)) => gone.push(*id),
            }
        }

        for id in gone {
            registry.viewers.remove(&id);
            tracing::debug!(viewer_id = %id, "Removed closed viewer queue");
        }

        OfferOutcome::Delivered {
            viewers: delivered,
            dropped,
        }
    }

    /// Register a new viewer.
    ///
    /// The first viewer after an idle period also receives the backlog.
    /// Subscribing to a closed buffer yields a subscription that ends
    /// immediately.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut registry = self.lock();

        if registry.closed {
            drop(tx);
            tracing::debug!(viewer_id = %id, "Subscribed to closed distribution buffer");
        } else {
            let backlog = registry.backlog.len();
            while let Some(reading) = registry.backlog.pop_front() {
                // Queue capacity equals backlog capacity, so this cannot fill up.
                let _ = tx.try_send(reading);
            }
            registry.viewers.insert(id, tx);
            tracing::info!(
                viewer_id = %id,
                viewers = registry.viewers.len(),
                backlog,
                "Viewer subscribed"
            );
        }

        Subscription {
            id,
            rx,
            buffer: Arc::downgrade(self),
        }
    }

    /// Close the buffer. Idempotent.
    ///
    /// Every viewer drains what was already queued and then sees the end
    /// of its stream. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        let mut registry = self.lock();
        if registry.closed {
            return false;
        }

        registry.closed = true;
        let viewers = registry.viewers.len();
        registry.viewers.clear();
        registry.backlog.clear();
        tracing::info!(viewers, "Distribution buffer closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn viewer_count(&self) -> usize {
        self.lock().viewers.len()
    }

    pub fn backlog_len(&self) -> usize {
        self.lock().backlog.len()
    }

    fn deregister(&self, id: &ViewerId) {
        let mut registry = self.lock();
        if registry.viewers.remove(id).is_some() {
            tracing::info!(
                viewer_id = %id,
                viewers = registry.viewers.len(),
                "Viewer unsubscribed"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One viewer's receiving end. Deregisters itself on drop.
pub struct Subscription {
    id: ViewerId,
    rx: mpsc::Receiver<Reading>,
    buffer: Weak<DistributionBuffer>,
}

impl Subscription {
    pub fn id(&self) -> ViewerId {
        self.id
    }

    /// Next reading, or `None` once the buffer is closed and drained.
    pub async fn recv(&mut self) -> Option<Reading> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = Reading;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Reading>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.upgrade() {
            buffer.deregister(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;
    use futures::StreamExt;

    use super::*;

    fn reading(soil_moisture: i32) -> Reading {
        Reading {
            temperature: 21.0,
            humidity: 48.0,
            soil_moisture,
            pump_active: false,
            observed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn every_viewer_receives_every_reading_in_order() {
        let buffer = DistributionBuffer::new(DEFAULT_CAPACITY);
        let mut viewers: Vec<_> = (0..5).map(|_| buffer.subscribe()).collect();

        for i in 0..20 {
            assert_eq!(
                buffer.offer(reading(i)),
                OfferOutcome::Delivered {
                    viewers: 5,
                    dropped: 0
                }
            );
        }

        for viewer in &mut viewers {
            for i in 0..20 {
                assert_eq!(viewer.recv().await.unwrap().soil_moisture, i);
            }
        }
    }

    #[tokio::test]
    async fn backlog_is_handed_to_next_subscriber() {
        let buffer = DistributionBuffer::new(DEFAULT_CAPACITY);

        assert_eq!(buffer.offer(reading(1)), OfferOutcome::Backlogged);
        assert_eq!(buffer.offer(reading(2)), OfferOutcome::Backlogged);

        let mut first = buffer.subscribe();
        let mut second = buffer.subscribe();
        buffer.offer(reading(3));

        assert_eq!(first.recv().await.unwrap().soil_moisture, 1);
        assert_eq!(first.recv().await.unwrap().soil_moisture, 2);
        assert_eq!(first.recv().await.unwrap().soil_moisture, 3);
        assert_eq!(second.recv().await.unwrap().soil_moisture, 3);
        assert_eq!(buffer.backlog_len(), 0);
    }

    #[test]
    fn full_backlog_drops_newest_without_blocking() {
        let buffer = DistributionBuffer::new(DEFAULT_CAPACITY);

        for i in 0..100 {
            assert_eq!(buffer.offer(reading(i)), OfferOutcome::Backlogged);
        }
        assert_eq!(buffer.offer(reading(100)), OfferOutcome::Dropped);
        assert_eq!(buffer.backlog_len(), 100);
    }

    #[tokio::test]
    async fn full_viewer_queue_drops_newest_for_that_viewer_only() {
        let buffer = DistributionBuffer::new(2);
        let mut slow = buffer.subscribe();
        let mut fast = buffer.subscribe();

        buffer.offer(reading(1));
        assert_eq!(fast.recv().await.unwrap().soil_moisture, 1);
        buffer.offer(reading(2));
        assert_eq!(fast.recv().await.unwrap().soil_moisture, 2);

        assert_eq!(
            buffer.offer(reading(3)),
            OfferOutcome::Delivered {
                viewers: 1,
                dropped: 1
            }
        );
        assert_eq!(fast.recv().await.unwrap().soil_moisture, 3);

        assert_eq!(slow.recv().await.unwrap().soil_moisture, 1);
        assert_eq!(slow.recv().await.unwrap().soil_moisture, 2);
    }

    #[tokio::test]
    async fn dropping_subscription_deregisters_viewer() {
        let buffer = DistributionBuffer::new(DEFAULT_CAPACITY);
        let sub = buffer.subscribe();
        assert_eq!(buffer.viewer_count(), 1);

        drop(sub);

        assert_eq!(buffer.viewer_count(), 0);
        assert_eq!(buffer.offer(reading(1)), OfferOutcome::Backlogged);
    }

    #[tokio::test]
    async fn close_ends_streams_after_draining() {
        let buffer = DistributionBuffer::new(DEFAULT_CAPACITY);
        let mut sub = buffer.subscribe();
        buffer.offer(reading(7));

        assert!(buffer.close());

        assert_eq!(sub.recv().await.unwrap().soil_moisture, 7);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn second_close_is_a_noop() {
        let buffer = DistributionBuffer::new(DEFAULT_CAPACITY);
        let mut sub = buffer.subscribe();

        assert!(buffer.close());
        assert!(!buffer.close());
        assert_matches!(buffer.offer(reading(1)), OfferOutcome::Closed);

        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscribing_after_close_terminates_immediately() {
        let buffer = DistributionBuffer::new(DEFAULT_CAPACITY);
        buffer.offer(reading(1));
        buffer.close();

        let sub = buffer.subscribe();
        let items: Vec<_> = sub.collect().await;

        assert!(items.is_empty());
        assert_eq!(buffer.viewer_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_viewers_on_separate_tasks_see_all_readings() {
        let buffer = DistributionBuffer::new(DEFAULT_CAPACITY);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sub = buffer.subscribe();
                tokio::spawn(async move {
                    sub.map(|r| r.soil_moisture).collect::<Vec<_>>().await
                })
            })
            .collect();

        for i in 0..50 {
            buffer.offer(reading(i));
        }
        buffer.close();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), (0..50).collect::<Vec<_>>());
        }
    }
}
