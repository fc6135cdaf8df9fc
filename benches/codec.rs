use criterion::{black_box, criterion_group, criterion_main, Criterion};
use net_benchmark::protocol::WireMessage;

fn bench_codec(c: &mut Criterion) {
    let message = WireMessage::new(
        "C[7]",
        "Server",
        "a payload: with embedded colons ".repeat(16),
    );
    let bytes = message.to_bytes();

    c.bench_function("encode", |b| b.iter(|| black_box(&message).to_bytes()));
    c.bench_function("decode", |b| {
        b.iter(|| WireMessage::from_bytes(black_box(&bytes)).unwrap())
    });
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
