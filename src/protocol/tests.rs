// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use futures::{SinkExt, StreamExt};
use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
use tokio_util::codec::Framed;

use crate::config::{CMD_AUTH_FAIL, CMD_AUTH_SUCCESS, CMD_LOGIN};
use crate::core::codec::{GateCodec, GateItem};
use crate::core::packet::{InboundFrame, OutboundFrame};
use crate::error::BridgeError;
use crate::protocol::handshake::*;

fn pair() -> (Framed<DuplexStream, GateCodec>, Framed<DuplexStream, GateCodec>) {
    let (client, gate) = duplex(4096);
    (Framed::new(client, GateCodec), Framed::new(gate, GateCodec))
}

async fn expect_login(gate: &mut Framed<DuplexStream, GateCodec>) -> (String, String) {
    let item = gate.next().await.expect("login frame").expect("decode");
    let remainder = match item {
        GateItem::Frame(remainder) => remainder,
        other => panic!("Expected a login frame, got {other:?}"),
    };
    let mut frame = InboundFrame::parse(remainder).unwrap();
    assert_eq!(frame.command(), CMD_LOGIN);
    (frame.read_str(), frame.read_str())
}

#[tokio::test]
async fn test_success_after_decoys() {
    let (mut client, mut gate) = pair();

    let peer = tokio::spawn(async move {
        let (user, pass) = expect_login(&mut gate).await;
        assert_eq!(user, "bridge");
        assert_eq!(pass, "s3cret");

        // Three decoys: an unrelated command, an empty frame, a truncated frame.
        gate.send(OutboundFrame::new(1514).build()).await.unwrap();
        gate.get_mut().write_all(&[0x00, 0x02]).await.unwrap();
        gate.get_mut()
            .write_all(&[0x00, 0x05, 0x80, 0x00, 0x00])
            .await
            .unwrap();
        gate.send(OutboundFrame::new(CMD_AUTH_SUCCESS).build())
            .await
            .unwrap();
        gate
    });

    let mut handshake = AuthHandshake::new(Credentials::new("bridge", "s3cret"));
    let auth = handshake.run(&mut client).await.expect("handshake");
    assert_eq!(auth.ignored_frames(), 3);
    assert_eq!(handshake.state(), &HandshakeState::Authenticated);

    peer.await.unwrap();
}

#[tokio::test]
async fn test_rejected_with_reason() {
    let (mut client, mut gate) = pair();

    let peer = tokio::spawn(async move {
        expect_login(&mut gate).await;
        let mut fail = OutboundFrame::new(CMD_AUTH_FAIL);
        fail.write_str("bad password").unwrap();
        gate.send(fail.build()).await.unwrap();
        gate
    });

    let mut handshake = AuthHandshake::new(Credentials::new("bridge", "wrong"));
    let err = handshake.run(&mut client).await.unwrap_err();
    assert!(matches!(&err, BridgeError::AuthRejected(reason) if reason == "bad password"));
    assert_eq!(
        handshake.state(),
        &HandshakeState::Rejected("bad password".into())
    );

    peer.await.unwrap();
}

#[tokio::test]
async fn test_connection_closed_while_waiting() {
    let (mut client, mut gate) = pair();

    let peer = tokio::spawn(async move {
        expect_login(&mut gate).await;
        drop(gate);
    });

    let mut handshake = AuthHandshake::new(Credentials::new("bridge", "pw"));
    let err = handshake.run(&mut client).await.unwrap_err();
    assert!(matches!(err, BridgeError::ConnectionClosed));
    assert_eq!(handshake.state(), &HandshakeState::AwaitingResponse);

    peer.await.unwrap();
}

#[tokio::test]
async fn test_handshake_runs_once() {
    let (mut client, mut gate) = pair();

    let peer = tokio::spawn(async move {
        expect_login(&mut gate).await;
        gate.send(OutboundFrame::new(CMD_AUTH_SUCCESS).build())
            .await
            .unwrap();
        gate
    });

    let mut handshake = AuthHandshake::new(Credentials::new("bridge", "pw"));
    handshake.run(&mut client).await.unwrap();
    let _gate = peer.await.unwrap();

    let again = handshake.run(&mut client).await;
    assert!(matches!(again, Err(BridgeError::HandshakeError(_))));
}
