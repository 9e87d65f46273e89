//! Criterion benchmarks for the per-recipient broadcast line.
//!
//! Run with:
//! ```bash
//! cargo bench --package relay-core --bench format_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use relay_core::{decode_text, format_broadcast, ConnectionId};

fn bench_format_short(c: &mut Criterion) {
    let sender = ConnectionId::new_random();
    c.bench_function("format_broadcast_short", |b| {
        b.iter(|| format_broadcast(black_box(sender), black_box("hi")))
    });
}

fn bench_decode_and_format_1k(c: &mut Criterion) {
    let sender = ConnectionId::new_random();
    let payload = "lorem ipsum ".repeat(86).into_bytes();
    c.bench_function("decode_and_format_1k", |b| {
        b.iter(|| {
            let text = decode_text(black_box(&payload)).expect("ascii payload");
            format_broadcast(sender, text)
        })
    });
}

criterion_group!(benches, bench_format_short, bench_decode_and_format_1k);
criterion_main!(benches);
