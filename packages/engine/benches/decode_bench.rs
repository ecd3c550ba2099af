// packages/engine/benches/decode_bench.rs
//! Structural decode throughput: hits, late hits and misses

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use wirelens_engine::schema::{Decoder, DecoderConfig, SchemaRegistry};

const ORDERS: &str = r#"
syntax = "proto3";
package orders;

message Order {
  string id = 1;
  repeated Line lines = 2;
  int64 total = 3;
}

message Line {
  string sku = 1;
  uint32 quantity = 2;
}
"#;

fn decoder() -> Decoder {
    let registry = Arc::new(SchemaRegistry::new());
    for n in 0..16 {
        let filler = format!("package filler{}; message F {{ fixed64 x = {}; }}", n, n + 20);
        registry.register(&format!("filler{}", n), &filler).unwrap();
    }
    registry.register("orders", ORDERS).unwrap();
    Decoder::new(registry, DecoderConfig::default())
}

/// Order { id: "o-1", lines: [Line { sku: "abc", quantity: 2 }; 8], total: 999 }
fn order_bytes() -> Vec<u8> {
    let mut out = vec![0x0a, 0x03, b'o', b'-', b'1'];
    for _ in 0..8 {
        out.extend_from_slice(&[0x12, 0x07, 0x0a, 0x03, b'a', b'b', b'c', 0x10, 0x02]);
    }
    out.extend_from_slice(&[0x18, 0xe7, 0x07]);
    out
}

fn bench_decode(c: &mut Criterion) {
    let decoder = decoder();
    let bytes = order_bytes();
    let garbage: Vec<u8> = (0..bytes.len()).map(|n| (n * 37 % 251) as u8).collect();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("hit_with_hint", |b| {
        b.iter(|| black_box(decoder.decode(&bytes, Some("orders"))))
    });
    group.bench_function("hit_after_fillers", |b| {
        b.iter(|| black_box(decoder.decode(&bytes, None)))
    });
    group.bench_function("miss", |b| b.iter(|| black_box(decoder.decode(&garbage, None))));

    group.finish();
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
