//! Inbound Reader.
//!
//! Reads frames from the gate for as long as the connection lives, routes
//! each through the [`Dispatcher`] and hands resulting events to the
//! [`CommandSink`].
//!
//! Delivery runs in its own task behind a bounded backlog so a slow sink
//! never holds up reads from the socket. When the backlog is full the event
//! is dropped and counted as a sink error.
//!
//! Garbage on the wire (frames too short to carry a command) is logged and
//! counted. A run of `max_protocol_errors` consecutive bad frames ends the
//! reader; any good frame resets the run. Transport errors and end of stream
//! end it immediately.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::core::codec::GateItem;
use crate::core::packet::InboundFrame;
use crate::error::{BridgeError, Result};
use crate::protocol::dispatcher::{Dispatcher, GateEvent};
use crate::protocol::handshake::Authenticated;
use crate::service::sink::CommandSink;
use crate::utils::metrics::Metrics;

pub struct InboundReader<S> {
    stream: S,
    dispatcher: Arc<Dispatcher>,
    sink: Arc<dyn CommandSink>,
    metrics: Arc<Metrics>,
    max_protocol_errors: u32,
    event_backlog: usize,
}

/// Default number of events queued for the sink before new ones are dropped
pub const DEFAULT_EVENT_BACKLOG: usize = 64;

impl<S> InboundReader<S>
where
    S: Stream<Item = Result<GateItem>> + Unpin + Send + 'static,
{
    pub fn new(
        _auth: &Authenticated,
        stream: S,
        dispatcher: Arc<Dispatcher>,
        sink: Arc<dyn CommandSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            stream,
            dispatcher,
            sink,
            metrics,
            max_protocol_errors: 16,
            event_backlog: DEFAULT_EVENT_BACKLOG,
        }
    }

    /// Events waiting for the sink before new ones are dropped.
    pub fn with_event_backlog(mut self, backlog: usize) -> Self {
        self.event_backlog = backlog.max(1);
        self
    }

    /// Consecutive protocol errors tolerated before giving up. Zero means unlimited.
    pub fn with_max_protocol_errors(mut self, max: u32) -> Self {
        self.max_protocol_errors = max;
        self
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    /// Read until the connection ends.
    ///
    /// Always returns an error: `ConnectionClosed` on end of stream, the
    /// transport error on I/O failure, or `ProtocolViolation` when the gate
    /// keeps sending garbage. Events already read are delivered before it
    /// returns.
    #[instrument(skip_all, name = "inbound_reader")]
    pub async fn run(mut self) -> Result<()> {
        info!("Inbound reader started");
        let (events, backlog) = mpsc::channel(self.event_backlog);
        let delivery = tokio::spawn(deliver(backlog, self.sink.clone(), self.metrics.clone()));

        let result = self.read_loop(&events).await;

        drop(events);
        if let Err(e) = delivery.await {
            warn!(error = %e, "Event delivery task failed");
        }
        result
    }

    async fn read_loop(&mut self, events: &mpsc::Sender<GateEvent>) -> Result<()> {
        let mut consecutive_errors = 0u32;

        loop {
            let item = match self.stream.next().await {
                None => {
                    info!("Gate closed the connection");
                    return Err(BridgeError::ConnectionClosed);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Read failed");
                    return Err(e);
                }
                Some(Ok(item)) => item,
            };

            let parsed = match item {
                GateItem::Empty(length) => Err(BridgeError::FrameTooShort(usize::from(length))),
                GateItem::Frame(remainder) => {
                    let len = remainder.len() as u64 + 2;
                    InboundFrame::parse(remainder).inspect(|_| self.metrics.frame_received(len))
                }
            };

            let mut frame = match parsed {
                Ok(frame) => {
                    consecutive_errors = 0;
                    frame
                }
                Err(e) => {
                    self.metrics.protocol_error();
                    consecutive_errors += 1;
                    warn!(error = %e, consecutive_errors, "Skipping malformed frame");
                    if self.max_protocol_errors > 0 && consecutive_errors >= self.max_protocol_errors {
                        return Err(BridgeError::ProtocolViolation(format!(
                            "{consecutive_errors} consecutive malformed frames"
                        )));
                    }
                    continue;
                }
            };

            let command = frame.command();
            let event = match self.dispatcher.dispatch(&mut frame) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    debug!(command, "No handler for command");
                    continue;
                }
                Err(e) => {
                    warn!(command, error = %e, "Handler failed");
                    continue;
                }
            };

            match events.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.metrics.sink_error();
                    warn!(command, "Event backlog full, event dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    self.metrics.sink_error();
                    warn!(command, "Event delivery stopped, event dropped");
                }
            }
        }
    }
}

async fn deliver(
    mut backlog: mpsc::Receiver<GateEvent>,
    sink: Arc<dyn CommandSink>,
    metrics: Arc<Metrics>,
) {
    while let Some(event) = backlog.recv().await {
        match sink.deliver(event).await {
            Ok(()) => metrics.event_delivered(),
            Err(e) => {
                metrics.sink_error();
                warn!(error = %e, "Command sink failed");
            }
        }
    }
}
