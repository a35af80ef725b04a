use criterion::{black_box, criterion_group, criterion_main, Criterion};
use status_engine::detect_ring_breaks;
use std::collections::HashMap;
use topology::{HostId, HostState, Link};

fn ring_with_breaks(size: i64) -> (Vec<Link>, HashMap<HostId, HostState>) {
    let links = (0..size)
        .filter_map(|i| Link::ring(i + 1, 1, i + 1, (i + 1) % size + 1).ok())
        .collect();
    let statuses = (1..=size)
        .map(|id| {
            let state = if id % 97 == 0 { HostState::Down } else { HostState::Up };
            (id, state)
        })
        .collect();
    (links, statuses)
}

fn bench_ring_break(c: &mut Criterion) {
    let (links, statuses) = ring_with_breaks(10_000);
    c.bench_function("ring_break_10k", |b| {
        b.iter(|| detect_ring_breaks(black_box(&links), black_box(&statuses)))
    });
}

criterion_group!(benches, bench_ring_break);
criterion_main!(benches);
