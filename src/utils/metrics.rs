//! Observability and Metrics
//!
//! Counters for the bridge: connection and handshake outcomes, frames on the
//! wire in both directions, and what happened to each queue message.
//!
//! Uses atomic counters for thread-safe metrics collection. One [`Metrics`]
//! instance is created per bridge and shared by `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug)]
pub struct Metrics {
    /// Total connections established
    pub connections_total: AtomicU64,
    /// Total handshake attempts
    pub handshakes_total: AtomicU64,
    /// Successful handshakes
    pub handshakes_success: AtomicU64,
    /// Failed handshakes
    pub handshakes_failed: AtomicU64,
    /// Frames written to the gate
    pub frames_sent: AtomicU64,
    /// Bytes written to the gate
    pub bytes_sent: AtomicU64,
    /// Frames read from the gate
    pub frames_received: AtomicU64,
    /// Bytes read from the gate
    pub bytes_received: AtomicU64,
    /// Socket write failures
    pub write_errors: AtomicU64,
    /// Short or empty frames from the gate
    pub protocol_errors: AtomicU64,
    /// Events handed to the command sink
    pub events_delivered: AtomicU64,
    /// Command sink failures
    pub sink_errors: AtomicU64,
    /// Queue messages pulled off the queue
    pub messages_received: AtomicU64,
    /// Queue messages turned into frames
    pub messages_forwarded: AtomicU64,
    /// Queue messages acknowledged
    pub messages_acknowledged: AtomicU64,
    /// Queue messages naming an unregistered action
    pub messages_unknown: AtomicU64,
    /// Queue messages that failed to decode or encode
    pub messages_rejected: AtomicU64,
    /// Queue receive/acknowledge failures
    pub queue_errors: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            handshakes_total: AtomicU64::new(0),
            handshakes_success: AtomicU64::new(0),
            handshakes_failed: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            sink_errors: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_forwarded: AtomicU64::new(0),
            messages_acknowledged: AtomicU64::new(0),
            messages_unknown: AtomicU64::new(0),
            messages_rejected: AtomicU64::new(0),
            queue_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_attempt(&self) {
        self.handshakes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_success(&self) {
        self.handshakes_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_failed(&self) {
        self.handshakes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_sent(&self, byte_count: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn frame_received(&self, byte_count: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_delivered(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_forwarded(&self) {
        self.messages_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_acknowledged(&self) {
        self.messages_acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_unknown(&self) {
        self.messages_unknown.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_rejected(&self) {
        self.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queue_error(&self) {
        self.queue_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            handshakes_total: self.handshakes_total.load(Ordering::Relaxed),
            handshakes_success: self.handshakes_success.load(Ordering::Relaxed),
            handshakes_failed: self.handshakes_failed.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_forwarded: self.messages_forwarded.load(Ordering::Relaxed),
            messages_acknowledged: self.messages_acknowledged.load(Ordering::Relaxed),
            messages_unknown: self.messages_unknown.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            queue_errors: self.queue_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn log_metrics(&self) {
        let s = self.snapshot();
        info!(
            connections_total = s.connections_total,
            handshakes_success = s.handshakes_success,
            handshakes_failed = s.handshakes_failed,
            frames_sent = s.frames_sent,
            bytes_sent = s.bytes_sent,
            frames_received = s.frames_received,
            bytes_received = s.bytes_received,
            write_errors = s.write_errors,
            protocol_errors = s.protocol_errors,
            events_delivered = s.events_delivered,
            sink_errors = s.sink_errors,
            messages_received = s.messages_received,
            messages_forwarded = s.messages_forwarded,
            messages_acknowledged = s.messages_acknowledged,
            messages_unknown = s.messages_unknown,
            messages_rejected = s.messages_rejected,
            queue_errors = s.queue_errors,
            uptime_seconds = s.uptime_seconds,
            "Bridge metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub handshakes_total: u64,
    pub handshakes_success: u64,
    pub handshakes_failed: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub frames_received: u64,
    pub bytes_received: u64,
    pub write_errors: u64,
    pub protocol_errors: u64,
    pub events_delivered: u64,
    pub sink_errors: u64,
    pub messages_received: u64,
    pub messages_forwarded: u64,
    pub messages_acknowledged: u64,
    pub messages_unknown: u64,
    pub messages_rejected: u64,
    pub queue_errors: u64,
    pub uptime_seconds: u64,
}

/// Log a snapshot every `interval`. A zero interval disables reporting.
pub fn spawn_reporter(metrics: Arc<Metrics>, interval: Duration) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            metrics.log_metrics();
        }
    }))
}
