use criterion::{criterion_group, criterion_main, Criterion};
use datrie::{Builder, Element4, Element5, Record};

const SIZES: [usize; 2] = [1_000, 10_000];

fn sorted_records(n: usize) -> Vec<Record<u32>> {
    (0..n)
        .map(|i| Record::new(format!("key{i:08}"), i as u32))
        .collect()
}

fn build_wide(c: &mut Criterion) {
    for n in SIZES {
        let records = sorted_records(n);
        c.bench_function(&format!("build_{n}_keys_5byte"), |b| {
            b.iter(|| {
                let mut builder = Builder::<u32, Element5>::new();
                builder.build(criterion::black_box(&records)).unwrap();
                builder.stats().da_elements
            });
        });
    }
}

fn build_compact(c: &mut Criterion) {
    for n in SIZES {
        let records = sorted_records(n);
        c.bench_function(&format!("build_{n}_keys_4byte"), |b| {
            b.iter(|| {
                let mut builder = Builder::<u32, Element4>::new();
                builder.build(criterion::black_box(&records)).unwrap();
                builder.stats().da_elements
            });
        });
    }
}

fn serialize(c: &mut Criterion) {
    let records = sorted_records(10_000);
    let mut builder = Builder::<u32>::new();
    builder.build(&records).unwrap();

    c.bench_function("serialize_10k_keys", |b| {
        b.iter(|| criterion::black_box(builder.write_to_bytes().unwrap().len()));
    });
}

criterion_group!(benches, build_wide, build_compact, serialize);
criterion_main!(benches);
