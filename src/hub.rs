//! # Distribution Hub
//! Fan-out of score updates to many subscribers (SSE, WebSocket, tests).
//!
//! Each subscriber owns a fixed-capacity queue. `publish` never blocks: when a
//! queue is full its oldest message is evicted to make room, so a slow
//! consumer sees gaps instead of growing memory or stalling the publisher.
//! The subscriber set has its own lock, independent of the engine lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::debug;

use crate::event::ScoreState;

/// Messages delivered to subscribers, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubMessage {
    ScoreUpdate { payload: Arc<ScoreState> },
    Heartbeat { ts: f64 },
}

impl HubMessage {
    pub fn score_update(state: ScoreState) -> Self {
        Self::ScoreUpdate {
            payload: Arc::new(state),
        }
    }
}

/// Result of one publish across all subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// Subscribers that had their oldest message evicted.
    pub dropped: usize,
}

#[derive(Debug)]
struct SubscriberQueue {
    buf: Mutex<VecDeque<HubMessage>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            buf: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    /// Push without blocking; returns `true` when the oldest item was evicted.
    fn push_drop_oldest(&self, msg: HubMessage) -> bool {
        let evicted = {
            let mut buf = self.buf.lock();
            let evicted = if buf.len() >= self.capacity {
                buf.pop_front();
                true
            } else {
                false
            };
            buf.push_back(msg);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    fn pop(&self) -> Option<HubMessage> {
        self.buf.lock().pop_front()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

#[derive(Debug)]
struct HubInner {
    subscribers: Mutex<Vec<(u64, Arc<SubscriberQueue>)>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl HubInner {
    fn remove(&self, id: u64) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|(sid, q)| {
            if *sid == id {
                q.close();
                false
            } else {
                true
            }
        });
        gauge!("hub_subscribers").set(subs.len() as f64);
        subs.len() != before
    }
}

/// Cheap to clone; all clones share one subscriber set.
#[derive(Debug, Clone)]
pub struct DistributionHub {
    inner: Arc<HubInner>,
}

impl DistributionHub {
    /// `capacity` is the per-subscriber queue length (at least 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register a subscriber whose queue already holds `initial`, so it never
    /// starts empty.
    pub fn subscribe(&self, initial: Option<HubMessage>) -> Subscription {
        self.subscribe_with(|| initial)
    }

    /// Like [`subscribe`](Self::subscribe), but `initial` is built while the
    /// subscriber set is locked. A publish racing with the call lands either
    /// before the snapshot is taken or after it in the queue, never in between.
    /// `initial` must not publish to this hub.
    pub fn subscribe_with<F>(&self, initial: F) -> Subscription
    where
        F: FnOnce() -> Option<HubMessage>,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SubscriberQueue::new(self.inner.capacity));

        let count = {
            let mut subs = self.inner.subscribers.lock();
            if let Some(msg) = initial() {
                queue.push_drop_oldest(msg);
            }
            subs.push((id, Arc::clone(&queue)));
            subs.len()
        };
        gauge!("hub_subscribers").set(count as f64);
        debug!(target: "hub", id, subscribers = count, "subscribed");

        Subscription {
            id,
            queue,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.inner.remove(id);
        if removed {
            debug!(target: "hub", id, "unsubscribed");
        }
        removed
    }

    pub fn publish(&self, msg: HubMessage) -> PublishReport {
        let subs = self.inner.subscribers.lock();
        let mut report = PublishReport::default();
        for (_, queue) in subs.iter() {
            if queue.push_drop_oldest(msg.clone()) {
                report.dropped += 1;
            }
            report.delivered += 1;
        }
        drop(subs);

        if report.dropped > 0 {
            counter!("hub_dropped_total").increment(report.dropped as u64);
        }
        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Close every subscriber; pending messages can still be drained.
    pub fn close_all(&self) {
        let mut subs = self.inner.subscribers.lock();
        for (_, q) in subs.drain(..) {
            q.close();
        }
        gauge!("hub_subscribers").set(0.0);
    }
}

/// Receiving end of one subscriber. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    queue: Arc<SubscriberQueue>,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next message; `None` once closed and drained.
    pub async fn recv(&mut self) -> Option<HubMessage> {
        loop {
            if let Some(msg) = self.queue.pop() {
                return Some(msg);
            }
            if self.queue.closed.load(Ordering::Acquire) {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }

    pub fn try_recv(&mut self) -> Option<HubMessage> {
        self.queue.pop()
    }

    pub fn pending(&self) -> usize {
        self.queue.buf.lock().len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hb(ts: f64) -> HubMessage {
        HubMessage::Heartbeat { ts }
    }

    #[test]
    fn full_queue_drops_oldest() {
        let hub = DistributionHub::new(2);
        let mut sub = hub.subscribe(None);
        hub.publish(hb(1.0));
        hub.publish(hb(2.0));
        let report = hub.publish(hb(3.0));
        assert_eq!(report, PublishReport { delivered: 1, dropped: 1 });
        assert_eq!(sub.try_recv(), Some(hb(2.0)));
        assert_eq!(sub.try_recv(), Some(hb(3.0)));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn drop_unsubscribes() {
        let hub = DistributionHub::new(4);
        let a = hub.subscribe(None);
        let b = hub.subscribe(None);
        assert_eq!(hub.subscriber_count(), 2);
        drop(a);
        assert_eq!(hub.subscriber_count(), 1);
        assert!(hub.unsubscribe(b.id()));
        assert!(!hub.unsubscribe(b.id()));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn heartbeat_wire_shape() {
        let v = serde_json::to_value(hb(12.5)).unwrap();
        assert_eq!(v["type"], "heartbeat");
        assert_eq!(v["ts"], 12.5);
    }
}
