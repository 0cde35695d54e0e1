//! # TCP Transport
//!
//! The gate is reachable over exactly one persistent TCP connection. This
//! module opens it and wraps it in the gate codec; the connection is then
//! handed to the handshake and, once authenticated, split between the
//! outbound serializer and the inbound reader.

use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{info, instrument};

use crate::core::codec::GateCodec;
use crate::error::{BridgeError, Result};

/// Connect to the gate server
#[instrument(fields(address = %addr))]
pub async fn connect(addr: &str, timeout: Duration) -> Result<Framed<TcpStream, GateCodec>> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| BridgeError::ConnectTimeout)??;

    stream.set_nodelay(true)?;
    if let Ok(peer) = stream.peer_addr() {
        info!(peer = %peer, "Connected to gate");
    }

    Ok(Framed::new(stream, GateCodec))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::packet::OutboundFrame;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, GateCodec);
            framed.next().await.unwrap().unwrap()
        });

        let mut client = connect(&addr, Duration::from_secs(2)).await.unwrap();
        client.send(OutboundFrame::new(99).build()).await.unwrap();

        let item = server.await.unwrap();
        assert_eq!(
            item,
            crate::core::codec::GateItem::Frame(bytes::Bytes::from_static(&[
                0x80, 0, 0, 0, 0, 99
            ]))
        );
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = connect(&addr, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(BridgeError::Io(_))));
    }
}
