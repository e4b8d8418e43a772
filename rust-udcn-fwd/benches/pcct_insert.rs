use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_udcn_common::ndn::{Interest, Name};
use rust_udcn_fwd::pcct::Pcct;

fn bench_pcct_insert(c: &mut Criterion) {
    c.bench_function("pcct_pit_insert_unique_names", |b| {
        b.iter(|| {
            let mut pcct = Pcct::new(65536, 16384);
            for i in 0..4096u32 {
                let interest = Interest::new(Name::from_string(&format!("/bench/pit/{i}")));
                black_box(pcct.pit_insert(&interest).unwrap());
            }
        })
    });

    c.bench_function("pcct_pit_insert_repeated_name", |b| {
        let interest = Interest::new(Name::from_string("/bench/hot/name"));
        b.iter(|| {
            let mut pcct = Pcct::new(65536, 16384);
            for _ in 0..4096 {
                black_box(pcct.pit_insert(&interest).unwrap());
            }
        })
    });
}

criterion_group!(benches, bench_pcct_insert);
criterion_main!(benches);
