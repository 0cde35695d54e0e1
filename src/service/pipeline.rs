//! Dispatch Pipeline.
//!
//! ```text
//! MessageQueue ─► poller ─► mpsc(50) ─► worker × N ─► OutboundHandle ─► serializer
//!                                          │
//!                                          └─► MessageQueue::acknowledge
//! ```
//!
//! A message is acknowledged only after its frame has been accepted by the
//! outbound queue. Anything that fails before that point is left on the
//! queue for redelivery.
//!
//! Workers run concurrently, so frames from different messages may reach the
//! gate in a different order than the queue delivered them. A single worker
//! preserves arrival order.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::{BridgeError, Result};
use crate::protocol::action::ActionRegistry;
use crate::protocol::message::{QueueEnvelope, QueueMessage};
use crate::service::writer::OutboundHandle;
use crate::transport::queue::MessageQueue;
use crate::utils::metrics::Metrics;

/// What happened to a message that was not rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Frame enqueued for the gate.
    Forwarded {
        action: &'static str,
        command: u16,
        acknowledged: bool,
    },
    /// The action name has no registered encoder.
    UnknownAction { name: String, acknowledged: bool },
}

/// Pull batches off the queue and feed them to the workers.
///
/// Returns `ChannelClosed` once every worker has gone away.
#[instrument(skip_all, name = "queue_poller")]
pub async fn poll_queue(
    queue: Arc<dyn MessageQueue>,
    tx: mpsc::Sender<QueueMessage>,
    backoff: Duration,
    metrics: Arc<Metrics>,
) -> Result<()> {
    info!("Queue poller started");
    loop {
        match queue.receive().await {
            Ok(batch) if batch.is_empty() => {
                tokio::time::sleep(backoff).await;
            }
            Ok(batch) => {
                debug!(count = batch.len(), "Received batch");
                for message in batch {
                    metrics.message_received();
                    tx.send(message)
                        .await
                        .map_err(|_| BridgeError::ChannelClosed)?;
                }
            }
            Err(e) => {
                metrics.queue_error();
                warn!(error = %e, "Queue receive failed, backing off");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Turns queue messages into gate frames.
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<ActionRegistry>,
    outbound: OutboundHandle,
    queue: Arc<dyn MessageQueue>,
    ack_unknown: bool,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    pub fn new(
        registry: Arc<ActionRegistry>,
        outbound: OutboundHandle,
        queue: Arc<dyn MessageQueue>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            outbound,
            queue,
            ack_unknown: false,
            metrics,
        }
    }

    /// Acknowledge messages whose action is not registered instead of leaving them.
    pub fn ack_unknown_actions(mut self, enabled: bool) -> Self {
        self.ack_unknown = enabled;
        self
    }

    /// Decode, encode, enqueue, then acknowledge one message.
    ///
    /// # Errors
    /// - `MalformedMessage`, `FieldOutOfRange`, `FrameOverflow`: the message is
    ///   rejected and not acknowledged
    /// - `ChannelClosed`: the serializer is gone
    #[instrument(skip_all, fields(receipt = %message.receipt))]
    pub async fn process(&self, message: &QueueMessage) -> Result<Outcome> {
        let envelope = QueueEnvelope::decode(&message.body).inspect_err(|_| {
            self.metrics.message_rejected();
        })?;

        let Some(action) = self.registry.get(&envelope.action_name) else {
            self.metrics.message_unknown();
            warn!(action = %envelope.action_name, "Unknown action");
            let acknowledged = self.ack_unknown && self.acknowledge(message).await;
            return Ok(Outcome::UnknownAction {
                name: envelope.action_name,
                acknowledged,
            });
        };

        let frame = action.encode(&envelope.payload).inspect_err(|_| {
            self.metrics.message_rejected();
        })?;
        let command = frame.command();

        self.outbound.send(frame).await?;
        self.metrics.message_forwarded();
        debug!(action = action.name(), command, "Frame enqueued");

        let acknowledged = self.acknowledge(message).await;
        Ok(Outcome::Forwarded {
            action: action.name(),
            command,
            acknowledged,
        })
    }

    async fn acknowledge(&self, message: &QueueMessage) -> bool {
        match self.queue.acknowledge(message).await {
            Ok(()) => {
                self.metrics.message_acknowledged();
                true
            }
            Err(e) => {
                self.metrics.queue_error();
                warn!(error = %e, "Acknowledge failed, message will be redelivered");
                false
            }
        }
    }
}

/// Start `workers` tasks sharing one receiver.
///
/// Each worker stops when the channel is drained and closed, or when the
/// outbound serializer is gone.
pub fn spawn_workers(
    pipeline: Pipeline,
    rx: mpsc::Receiver<QueueMessage>,
    workers: usize,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));
    (0..workers.max(1))
        .map(|id| {
            let pipeline = pipeline.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(message) = next else {
                        debug!(worker = id, "Message channel closed");
                        return;
                    };

                    match pipeline.process(&message).await {
                        Ok(_) => {}
                        Err(BridgeError::ChannelClosed) => {
                            info!(worker = id, "Outbound queue closed, worker stopping");
                            return;
                        }
                        Err(e) => {
                            warn!(worker = id, receipt = %message.receipt, error = %e, "Message rejected");
                        }
                    }
                }
            })
        })
        .collect()
}
