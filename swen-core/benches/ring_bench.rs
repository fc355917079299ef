#[macro_use]
extern crate criterion;

use criterion::Criterion;

use swen_core::ring::SpscRing;

fn bench_ring_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_throughput");

    for capacity in [16, 256, 4096] {
        group.throughput(criterion::Throughput::Elements(capacity as u64));
        group.bench_function(format!("capacity_{}", capacity), |b| {
            let ring = SpscRing::with_capacity(capacity).unwrap();
            b.iter(|| {
                ring.try_push(0xA5u8).unwrap();
                ring.try_pop().unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ring_push_pop);
criterion_main!(benches);
