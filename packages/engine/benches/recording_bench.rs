// packages/engine/benches/recording_bench.rs
//! Recorder append/update throughput and search over a full buffer

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use wirelens_engine::query::QueryEngine;
use wirelens_engine::recording::{EventPatch, EventRecorder, Headers, PartialEvent, TransportKind};

fn pending(n: usize) -> PartialEvent {
    PartialEvent::pending(
        format!("req-{}", n),
        TransportKind::RequestResponse,
        format!("http://api.test/items/{}", n),
    )
    .with_method(if n % 3 == 0 { "POST" } else { "GET" })
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("recorder_append");

    for capacity in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(capacity as u64 * 2));
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &capacity| {
            b.iter(|| {
                // Twice the capacity, so half the appends evict
                let recorder = EventRecorder::with_capacity(capacity);
                for n in 0..capacity * 2 {
                    recorder.append(pending(n));
                }
                black_box(recorder.len())
            });
        });
    }

    group.finish();
}

fn bench_update(c: &mut Criterion) {
    c.bench_function("recorder_update_1000", |b| {
        b.iter_batched(
            || {
                let recorder = EventRecorder::with_capacity(1_000);
                for n in 0..1_000 {
                    recorder.append(pending(n));
                }
                recorder
            },
            |recorder| {
                for n in (0..1_000).rev() {
                    recorder.update(
                        &format!("req-{}", n),
                        EventPatch::completed(Some(200), Headers::new(), None),
                    );
                }
                recorder
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_search(c: &mut Criterion) {
    let recorder = EventRecorder::with_capacity(1_000);
    for n in 0..1_000 {
        recorder.append(pending(n));
    }
    let events = recorder.snapshot();
    let engine = QueryEngine::default();

    c.bench_function("full_text_search_1000", |b| {
        b.iter(|| black_box(engine.full_text_search(&events, "post items/99")))
    });
}

criterion_group!(benches, bench_append, bench_update, bench_search);
criterion_main!(benches);
