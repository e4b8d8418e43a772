use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_udcn_fwd::queue::{PktQueue, PopPolicy};
use std::time::{Duration, Instant};

fn bench_codel_pop(c: &mut Criterion) {
    c.bench_function("codel_pop_under_light_load", |b| {
        b.iter(|| {
            let mut q: PktQueue<u32> = PktQueue::new(
                1024,
                PopPolicy::CoDel,
                Duration::from_millis(5),
                Duration::from_millis(100),
                32,
            );
            let t0 = Instant::now();
            for i in 0..256u32 {
                let _ = q.push(i, t0);
                if i % 8 == 7 {
                    black_box(q.pop(t0 + Duration::from_micros(i as u64)));
                }
            }
        })
    });

    c.bench_function("codel_pop_under_sustained_overload", |b| {
        b.iter(|| {
            let mut q: PktQueue<u32> = PktQueue::new(
                1024,
                PopPolicy::CoDel,
                Duration::from_millis(5),
                Duration::from_millis(100),
                32,
            );
            let t0 = Instant::now();
            for i in 0..1024u32 {
                let _ = q.push(i, t0);
            }
            for step in 0..256u64 {
                black_box(q.pop(t0 + Duration::from_millis(step)));
            }
        })
    });
}

criterion_group!(benches, bench_codel_pop);
criterion_main!(benches);
