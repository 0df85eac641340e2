//! Codec benchmarks for huddle-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use huddle_protocol::{codec, ClientEvent, Signal, WireFormat};
use serde_json::json;

fn offer_event(sdp_len: usize) -> ClientEvent {
    ClientEvent::Offer(Signal {
        payload: json!({"type": "offer", "sdp": "a".repeat(sdp_len)}),
        to: "conn_18c2f_2a".into(),
    })
}

fn bench_encode(c: &mut Criterion) {
    let event = offer_event(2048);

    let mut group = c.benchmark_group("encode_offer");
    group.throughput(Throughput::Bytes(2048));
    group.bench_function("json", |b| {
        b.iter(|| codec::encode(black_box(&event), WireFormat::Json))
    });
    group.bench_function("msgpack", |b| {
        b.iter(|| codec::encode(black_box(&event), WireFormat::Msgpack))
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let event = offer_event(2048);
    let text = codec::encode_json(&event).unwrap();
    let binary = codec::encode_binary(&event).unwrap();

    let mut group = c.benchmark_group("decode_offer");
    group.bench_function("json", |b| {
        b.iter(|| codec::decode_json::<ClientEvent>(black_box(&text)))
    });
    group.bench_function("msgpack", |b| {
        b.iter(|| codec::decode::<ClientEvent>(black_box(&binary)))
    });
    group.finish();
}

fn bench_join_roundtrip(c: &mut Criterion) {
    let event = ClientEvent::join("weekly-sync", "peer-7f3a", "Alice");

    c.bench_function("join_roundtrip_json", |b| {
        b.iter(|| {
            let text = codec::encode_json(black_box(&event)).unwrap();
            codec::decode_json::<ClientEvent>(black_box(&text)).unwrap()
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_join_roundtrip);
criterion_main!(benches);
