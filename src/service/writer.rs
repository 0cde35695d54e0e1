//! Outbound Serializer.
//!
//! The gate connection has exactly one writer. Producers never touch the
//! socket; they push complete frames into a bounded channel and this task
//! writes them one at a time, so frames never interleave on the wire.
//!
//! ```text
//! worker 1 ─┐
//! worker 2 ─┼─► mpsc::Sender<WireFrame> ─► serializer ─► socket
//! worker N ─┘
//! ```
//!
//! Each frame is buffered and then flushed. Under [`WriteErrorPolicy::Continue`]
//! a failed flush leaves the frame in the write buffer and the next flush
//! retries it; a frame that could not be buffered at all is dropped. A frame
//! only counts as sent once a flush carrying it succeeds.

use futures::{Sink, SinkExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::WriteErrorPolicy;
use crate::core::packet::WireFrame;
use crate::error::{BridgeError, Result};
use crate::protocol::handshake::Authenticated;
use crate::utils::metrics::Metrics;

/// Cloneable producer side of the outbound queue.
#[derive(Debug, Clone)]
pub struct OutboundHandle {
    tx: mpsc::Sender<WireFrame>,
}

impl OutboundHandle {
    /// Enqueue a frame, waiting while the queue is full.
    pub async fn send(&self, frame: WireFrame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| BridgeError::ChannelClosed)
    }

    #[cfg(test)]
    pub(crate) fn detached(capacity: usize) -> (Self, mpsc::Receiver<WireFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

pub struct OutboundSerializer;

impl OutboundSerializer {
    /// Start the serializer over the write half of an authenticated connection.
    ///
    /// The task ends when every [`OutboundHandle`] is dropped, or on the first
    /// write failure under [`WriteErrorPolicy::Abort`].
    pub fn spawn<S>(
        _auth: &Authenticated,
        sink: S,
        capacity: usize,
        policy: WriteErrorPolicy,
        metrics: Arc<Metrics>,
    ) -> (OutboundHandle, JoinHandle<Result<()>>)
    where
        S: Sink<WireFrame, Error = BridgeError> + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(run(sink, rx, policy, metrics));
        (OutboundHandle { tx }, task)
    }
}

async fn run<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<WireFrame>,
    policy: WriteErrorPolicy,
    metrics: Arc<Metrics>,
) -> Result<()>
where
    S: Sink<WireFrame, Error = BridgeError> + Unpin,
{
    info!(?policy, "Outbound serializer started");
    // Lengths of frames buffered but not yet flushed, oldest first.
    let mut unflushed: Vec<u64> = Vec::new();

    while let Some(frame) = rx.recv().await {
        let command = frame.command();
        let len = frame.len() as u64;

        if let Err(e) = sink.feed(frame).await {
            metrics.write_error();
            match policy {
                WriteErrorPolicy::Abort => {
                    error!(command, error = %e, "Write failed, stopping serializer");
                    return Err(e);
                }
                WriteErrorPolicy::Continue => {
                    warn!(command, error = %e, "Write failed, frame dropped");
                    continue;
                }
            }
        }
        unflushed.push(len);

        match sink.flush().await {
            Ok(()) => {
                for len in unflushed.drain(..) {
                    metrics.frame_sent(len);
                }
                debug!(command, len, "Frame written");
            }
            Err(e) => {
                metrics.write_error();
                match policy {
                    WriteErrorPolicy::Abort => {
                        error!(command, error = %e, "Write failed, stopping serializer");
                        return Err(e);
                    }
                    WriteErrorPolicy::Continue => {
                        warn!(
                            command,
                            buffered = unflushed.len(),
                            error = %e,
                            "Flush failed, frame stays buffered for the next flush"
                        );
                    }
                }
            }
        }
    }

    info!("Outbound queue closed, serializer stopping");
    sink.close().await?;
    for len in unflushed {
        metrics.frame_sent(len);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::codec::{GateCodec, GateItem};
    use crate::core::packet::OutboundFrame;
    use futures::StreamExt;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::AsyncWrite;
    use tokio_util::codec::{FramedRead, FramedWrite};

    fn frame(command: u16, value: u16) -> WireFrame {
        let mut f = OutboundFrame::new(command);
        f.write_u16(value).unwrap();
        f.build()
    }

    #[tokio::test]
    async fn test_frames_written_in_enqueue_order() {
        let (client, server) = tokio::io::duplex(4096);
        let metrics = Arc::new(Metrics::new());
        let (handle, task) = OutboundSerializer::spawn(
            &Authenticated::for_tests(),
            FramedWrite::new(client, GateCodec),
            4,
            WriteErrorPolicy::Abort,
            metrics.clone(),
        );

        for i in 0..10 {
            handle.send(frame(8010, i)).await.unwrap();
        }
        drop(handle);
        task.await.unwrap().unwrap();

        let mut reader = FramedRead::new(server, GateCodec);
        for i in 0..10u16 {
            let GateItem::Frame(remainder) = reader.next().await.unwrap().unwrap() else {
                panic!("expected frame");
            };
            assert_eq!(&remainder[4..6], &8010u16.to_be_bytes());
            assert_eq!(&remainder[6..], &i.to_be_bytes());
        }
        assert!(reader.next().await.is_none());
        assert_eq!(metrics.snapshot().frames_sent, 10);
        assert_eq!(metrics.snapshot().bytes_sent, 100);
    }

    #[tokio::test]
    async fn test_concurrent_producers_do_not_interleave() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (handle, task) = OutboundSerializer::spawn(
            &Authenticated::for_tests(),
            FramedWrite::new(client, GateCodec),
            2,
            WriteErrorPolicy::Abort,
            Arc::new(Metrics::new()),
        );

        let mut producers = Vec::new();
        for p in 0..8u16 {
            let handle = handle.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..25u16 {
                    let mut f = OutboundFrame::new(p);
                    f.write_str(&"x".repeat(usize::from(i) * 3)).unwrap();
                    handle.send(f.build()).await.unwrap();
                }
            }));
        }
        for p in producers {
            p.await.unwrap();
        }
        drop(handle);
        task.await.unwrap().unwrap();

        let mut reader = FramedRead::new(server, GateCodec);
        let mut count = 0;
        while let Some(item) = reader.next().await {
            let GateItem::Frame(remainder) = item.unwrap() else {
                panic!("expected frame");
            };
            let mut parsed = crate::core::packet::InboundFrame::parse(remainder).unwrap();
            assert!(parsed.command() < 8);
            let s = parsed.read_str();
            assert!(s.bytes().all(|b| b == b'x'));
            assert_eq!(parsed.remaining(), 0);
            count += 1;
        }
        assert_eq!(count, 200);
    }

    /// Fails the first `failures` writes, then passes through.
    struct FlakyWriter {
        inner: tokio::io::DuplexStream,
        failures: usize,
    }

    impl AsyncWrite for FlakyWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            if self.failures > 0 {
                self.failures -= 1;
                return Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "transient write failure",
                )));
            }
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    #[tokio::test]
    async fn test_continue_policy_retries_buffered_frame() {
        let (client, server) = tokio::io::duplex(4096);
        let metrics = Arc::new(Metrics::new());
        let writer = FlakyWriter {
            inner: client,
            failures: 1,
        };
        let (handle, task) = OutboundSerializer::spawn(
            &Authenticated::for_tests(),
            FramedWrite::new(writer, GateCodec),
            4,
            WriteErrorPolicy::Continue,
            metrics.clone(),
        );

        for command in [100, 101, 102] {
            handle.send(frame(command, 0)).await.unwrap();
        }
        drop(handle);
        task.await.unwrap().unwrap();

        let mut reader = FramedRead::new(server, GateCodec);
        let mut commands = Vec::new();
        while let Some(item) = reader.next().await {
            let GateItem::Frame(remainder) = item.unwrap() else {
                panic!("expected frame");
            };
            commands.push(u16::from_be_bytes([remainder[4], remainder[5]]));
        }

        // The frame whose first flush failed still reaches the wire, once and in order.
        assert_eq!(commands, [100, 101, 102]);
        let snap = metrics.snapshot();
        assert_eq!(snap.write_errors, 1);
        assert_eq!(snap.frames_sent, 3);
        assert_eq!(snap.bytes_sent, 30);
    }

    #[tokio::test]
    async fn test_abort_policy_stops_on_write_error() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let metrics = Arc::new(Metrics::new());
        let (handle, task) = OutboundSerializer::spawn(
            &Authenticated::for_tests(),
            FramedWrite::new(client, GateCodec),
            4,
            WriteErrorPolicy::Abort,
            metrics.clone(),
        );

        handle.send(frame(1, 1)).await.unwrap();
        assert!(task.await.unwrap().is_err());
        assert_eq!(metrics.snapshot().write_errors, 1);

        // The receiver is gone once the task has returned.
        assert!(matches!(
            handle.send(frame(1, 2)).await,
            Err(BridgeError::ChannelClosed)
        ));
    }
}
