use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_udcn_common::ndn::Name;
use rust_udcn_common::types::FaceId;
use rust_udcn_fwd::fib::Fib;

fn populated_fib(n: usize) -> Fib {
    let fib = Fib::new();
    for i in 0..n {
        let name = Name::from_string(&format!("/bench/prefix/{i}"));
        fib.insert(name, std::iter::once(FaceId(1)).collect(), 0);
    }
    fib
}

fn bench_fib_lookup(c: &mut Criterion) {
    let fib = populated_fib(10_000);
    let hit = Name::from_string("/bench/prefix/4242/extra/components/here");
    let miss = Name::from_string("/nowhere/near/any/entry");

    c.bench_function("fib_lookup_hit", |b| {
        b.iter(|| {
            let guard = fib.load();
            black_box(guard.lookup(black_box(&hit)));
        })
    });

    c.bench_function("fib_lookup_miss", |b| {
        b.iter(|| {
            let guard = fib.load();
            black_box(guard.lookup(black_box(&miss)));
        })
    });
}

criterion_group!(benches, bench_fib_lookup);
criterion_main!(benches);
