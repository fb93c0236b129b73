use criterion::{criterion_group, criterion_main, Criterion};
use mmdb_sift::{Reader, RecordBuilder, RecordSize};
use std::hint::black_box;
use std::net::IpAddr;

#[path = "../tests/common/mod.rs"]
mod common;

#[derive(Default)]
struct Acc {
    string1: String,
    uint32: i64,
    prefix_len: u32,
}

// Benchmark: tree walk + selective decode on the steady-state path
fn bench_lookup(c: &mut Criterion) {
    let reader = Reader::from_bytes(common::decoder_db(RecordSize::Bits24)).unwrap();

    let mut builder = RecordBuilder::<Acc>::new();
    builder
        .on_network(|s: &mut Acc, _, pl| s.prefix_len = pl)
        .unwrap();
    builder
        .text("utf8_string", |s, v| {
            s.string1.clear();
            s.string1.push_str(v);
        })
        .unwrap();
    builder.integer("uint32", |s, v| s.uint32 = v).unwrap();
    let spec = builder.build();

    let hit: IpAddr = "::1.1.1.0".parse().unwrap();
    let miss: IpAddr = "::9.9.9.9".parse().unwrap();
    let mut acc = Acc {
        string1: String::with_capacity(64),
        ..Default::default()
    };

    let mut group = c.benchmark_group("lookup");

    group.bench_function("hit_with_decode", |b| {
        b.iter(|| {
            reader
                .lookup(black_box(hit), &spec, &mut acc)
                .unwrap();
            black_box(acc.uint32);
        });
    });

    group.bench_function("miss_network_only", |b| {
        b.iter(|| {
            reader
                .lookup(black_box(miss), &spec, &mut acc)
                .unwrap();
            black_box(acc.prefix_len);
        });
    });

    group.bench_function("ipv4_fast_path", |b| {
        b.iter(|| {
            reader
                .lookup_bytes(black_box(&[1, 1, 1, 3]), &spec, &mut acc)
                .unwrap();
            black_box(acc.uint32);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_lookup);
criterion_main!(benches);
