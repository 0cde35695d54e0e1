//! # Message Queue Boundary
//!
//! The bridge needs only two things from the queue it drains: a batch
//! receive and a per-message acknowledge. Redelivery of unacknowledged
//! messages is the queue's business.
//!
//! [`LocalQueue`] is an in-process implementation with the same at-least-once
//! shape: a received message stays hidden until it is acknowledged or its
//! visibility timeout runs out, after which it is delivered again ahead of
//! anything pushed since.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{constants, BridgeError, Result};
use crate::protocol::message::QueueMessage;

/// Default time a received message stays hidden
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Fetch the next batch. May return an empty batch after waiting.
    async fn receive(&self) -> Result<Vec<QueueMessage>>;

    /// Delete a message so it is not delivered again.
    async fn acknowledge(&self, message: &QueueMessage) -> Result<()>;
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    message: QueueMessage,
}

#[derive(Debug)]
struct InFlight {
    entry: Entry,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Entry>,
    in_flight: HashMap<String, InFlight>,
}

impl QueueState {
    /// Put expired in-flight messages back at the front, oldest first.
    /// Returns how many came back and when the next one expires.
    fn requeue_expired(&mut self, now: Instant) -> (usize, Option<Instant>) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        let mut returned: Vec<Entry> = expired
            .iter()
            .filter_map(|receipt| self.in_flight.remove(receipt))
            .map(|f| f.entry)
            .collect();
        returned.sort_by_key(|e| e.seq);
        let count = returned.len();
        for entry in returned.into_iter().rev() {
            self.pending.push_front(entry);
        }

        let next = self.in_flight.values().map(|f| f.visible_at).min();
        (count, next)
    }
}

/// In-memory queue
#[derive(Debug)]
pub struct LocalQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    next_seq: AtomicU64,
    acknowledged: AtomicU64,
    redelivered: AtomicU64,
    batch_size: usize,
    wait: Duration,
    visibility_timeout: Duration,
}

impl LocalQueue {
    /// `batch_size` messages at most per receive; an empty receive waits up to `wait`.
    pub fn new(batch_size: usize, wait: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            next_seq: AtomicU64::new(1),
            acknowledged: AtomicU64::new(0),
            redelivered: AtomicU64::new(0),
            batch_size: batch_size.max(1),
            wait,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
        }
    }

    /// How long a received message stays hidden before it is delivered again.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>> {
        self.state
            .lock()
            .map_err(|_| BridgeError::QueueError(constants::ERR_LOCK_POISONED.into()))
    }

    /// Enqueue a raw body and return its receipt handle.
    pub fn push(&self, body: impl Into<String>) -> Result<String> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let receipt = format!("local-{seq}");
        self.lock()?.pending.push_back(Entry {
            seq,
            message: QueueMessage::new(receipt.clone(), body),
        });
        self.notify.notify_one();
        Ok(receipt)
    }

    pub fn pending_len(&self) -> usize {
        self.lock().map(|s| s.pending.len()).unwrap_or(0)
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().map(|s| s.in_flight.len()).unwrap_or(0)
    }

    pub fn acknowledged(&self) -> u64 {
        self.acknowledged.load(Ordering::Relaxed)
    }

    /// Messages delivered again after their visibility timeout ran out.
    pub fn redelivered(&self) -> u64 {
        self.redelivered.load(Ordering::Relaxed)
    }

    /// Take the next batch, returning expired messages to the queue first.
    /// Also reports the next in-flight expiry so an empty receive can wake for it.
    fn take_batch(&self) -> Result<(Vec<QueueMessage>, Option<Instant>)> {
        let now = Instant::now();
        let mut state = self.lock()?;
        let (returned, next_expiry) = state.requeue_expired(now);
        if returned > 0 {
            self.redelivered.fetch_add(returned as u64, Ordering::Relaxed);
            debug!(returned, "Visibility timeout expired, messages returned to queue");
        }

        let n = self.batch_size.min(state.pending.len());
        let taken: Vec<Entry> = state.pending.drain(..n).collect();
        let visible_at = now + self.visibility_timeout;
        let mut batch = Vec::with_capacity(taken.len());
        for entry in taken {
            batch.push(entry.message.clone());
            state
                .in_flight
                .insert(entry.message.receipt.clone(), InFlight { entry, visible_at });
        }

        let next_expiry = if batch.is_empty() {
            next_expiry
        } else {
            Some(next_expiry.map_or(visible_at, |t| t.min(visible_at)))
        };
        Ok((batch, next_expiry))
    }
}

impl Default for LocalQueue {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(20))
    }
}

#[async_trait]
impl MessageQueue for LocalQueue {
    async fn receive(&self) -> Result<Vec<QueueMessage>> {
        let deadline = Instant::now() + self.wait;
        loop {
            let (batch, next_expiry) = self.take_batch()?;
            if !batch.is_empty() {
                return Ok(batch);
            }
            let wake = next_expiry.map_or(deadline, |t| t.min(deadline));
            let notified = tokio::time::timeout_at(wake, self.notify.notified()).await;
            if notified.is_err() && wake >= deadline {
                return Ok(Vec::new());
            }
        }
    }

    async fn acknowledge(&self, message: &QueueMessage) -> Result<()> {
        let removed = self.lock()?.in_flight.remove(&message.receipt);
        match removed {
            Some(_) => {
                self.acknowledged.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(BridgeError::QueueError(format!(
                "{}: {}",
                constants::ERR_UNKNOWN_RECEIPT,
                message.receipt
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receive_respects_batch_size() {
        let queue = LocalQueue::new(2, Duration::from_millis(10));
        for i in 0..3 {
            queue.push(format!("body-{i}")).unwrap();
        }
        let first = queue.receive().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].body, "body-0");
        let second = queue.receive().await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(queue.in_flight_len(), 3);
    }

    #[tokio::test]
    async fn test_empty_receive_times_out() {
        let queue = LocalQueue::new(10, Duration::from_millis(20));
        assert!(queue.receive().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_receive_wakes_on_push() {
        let queue = std::sync::Arc::new(LocalQueue::new(10, Duration::from_secs(5)));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.receive().await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push("late").unwrap();
        let batch = waiter.await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, "late");
    }

    #[tokio::test]
    async fn test_acknowledge_removes_in_flight() {
        let queue = LocalQueue::new(10, Duration::from_millis(10));
        queue.push("a").unwrap();
        queue.push("b").unwrap();
        let batch = queue.receive().await.unwrap();

        queue.acknowledge(&batch[0]).await.unwrap();
        assert!(queue.acknowledge(&batch[0]).await.is_err());
        assert_eq!(queue.acknowledged(), 1);
        assert_eq!(queue.in_flight_len(), 1);
    }

    #[tokio::test]
    async fn test_unacknowledged_message_returns_after_visibility_timeout() {
        let queue = LocalQueue::new(10, Duration::from_millis(10))
            .with_visibility_timeout(Duration::from_millis(80));
        queue.push("kick").unwrap();
        let first = queue.receive().await.unwrap();
        assert_eq!(first.len(), 1);

        // Hidden while the timeout runs.
        assert!(queue.receive().await.unwrap().is_empty());
        assert_eq!(queue.in_flight_len(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let again = queue.receive().await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].receipt, first[0].receipt);
        assert_eq!(again[0].body, "kick");
        assert_eq!(queue.redelivered(), 1);

        // Acknowledging the redelivered copy removes it for good.
        queue.acknowledge(&again[0]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(queue.receive().await.unwrap().is_empty());
        assert_eq!(queue.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn test_waiting_receive_wakes_for_expiry() {
        let queue = LocalQueue::new(10, Duration::from_secs(5))
            .with_visibility_timeout(Duration::from_millis(50));
        queue.push("a").unwrap();
        queue.receive().await.unwrap();

        let started = std::time::Instant::now();
        let again = queue.receive().await.unwrap();
        assert_eq!(again[0].body, "a");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_expired_messages_go_ahead_of_newer_ones() {
        let queue = LocalQueue::new(10, Duration::from_millis(10))
            .with_visibility_timeout(Duration::from_millis(30));
        for body in ["m1", "m2", "m3", "m4", "m5", "m6", "m7", "m8", "m9", "m10"] {
            queue.push(body).unwrap();
        }
        assert_eq!(queue.receive().await.unwrap().len(), 10);
        queue.push("late").unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let bodies: Vec<String> = queue
            .receive()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(
            bodies,
            ["m1", "m2", "m3", "m4", "m5", "m6", "m7", "m8", "m9", "m10"]
        );
        assert_eq!(queue.receive().await.unwrap()[0].body, "late");
    }
}
