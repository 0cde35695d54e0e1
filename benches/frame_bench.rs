use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use gate_bridge::config::CMD_CHAT_RELAY;
use gate_bridge::core::codec::{GateCodec, GateItem};
use gate_bridge::core::packet::{InboundFrame, OutboundFrame};
use gate_bridge::protocol::action::ActionRegistry;
use gate_bridge::protocol::message::QueueEnvelope;
use serde_json::json;
use tokio_util::codec::{Decoder, Encoder};

#[allow(clippy::unwrap_used)]
fn bench_frame_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode_decode");
    let content_sizes = [0usize, 64, 256, 900];

    for &size in &content_sizes {
        let content = "x".repeat(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("encode_chat_{size}b"), |b| {
            b.iter(|| {
                let mut frame = OutboundFrame::new(CMD_CHAT_RELAY);
                frame.write_str("Alice").unwrap();
                frame.write_str("World").unwrap();
                frame.write_str(&content).unwrap();
                frame.build()
            })
        });

        let mut wire = BytesMut::new();
        let mut frame = OutboundFrame::new(CMD_CHAT_RELAY);
        frame.write_str("Alice").unwrap();
        frame.write_str("World").unwrap();
        frame.write_str(&content).unwrap();
        GateCodec.encode(frame.build(), &mut wire).unwrap();

        group.bench_function(format!("decode_chat_{size}b"), |b| {
            b.iter_batched(
                || wire.clone(),
                |mut buf| {
                    let Some(GateItem::Frame(remainder)) = GateCodec.decode(&mut buf).unwrap() else {
                        unreachable!();
                    };
                    let mut inbound = InboundFrame::parse(remainder).unwrap();
                    (inbound.read_str(), inbound.read_str(), inbound.read_str())
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_queue_message_to_frame(c: &mut Criterion) {
    let registry = ActionRegistry::standard();
    let body = QueueEnvelope {
        action_name: "AcceptPlayerInGuild".into(),
        payload: json!({"AccepterCharId": 5, "ApplierCharId": 9, "GuildId": 2}),
    }
    .encode()
    .unwrap();

    c.bench_function("queue_message_to_frame", |b| {
        b.iter(|| {
            let envelope = QueueEnvelope::decode(&body).unwrap();
            let action = registry.get(&envelope.action_name).unwrap();
            action.encode(&envelope.payload).unwrap()
        })
    });
}

criterion_group!(benches, bench_frame_encode_decode, bench_queue_message_to_frame);
criterion_main!(benches);
