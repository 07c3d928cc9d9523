use criterion::{criterion_group, criterion_main, Criterion};
use datrie::{Builder, Record, Trie};

const N: usize = 10_000;

fn build_trie() -> Trie<'static, u32> {
    let records: Vec<Record<u32>> = (0..N)
        .map(|i| Record::new(format!("key{i:08}"), i as u32))
        .collect();
    let mut builder = Builder::<u32>::new();
    builder.build(&records).unwrap();
    Trie::from_builder(builder)
}

fn exact_match_hits(c: &mut Criterion) {
    let trie = build_trie();
    c.bench_function("exact_match_10k_hits", |b| {
        b.iter(|| {
            for i in 0..N {
                let key = format!("key{i:08}");
                criterion::black_box(trie.find(key.as_bytes()).unwrap());
            }
        });
    });
}

fn exact_match_misses(c: &mut Criterion) {
    let trie = build_trie();
    c.bench_function("exact_match_10k_misses", |b| {
        b.iter(|| {
            for i in 0..N {
                let key = format!("nope{i:08}");
                criterion::black_box(trie.contains(key.as_bytes()));
            }
        });
    });
}

fn prefix_cursor(c: &mut Criterion) {
    let trie = build_trie();
    c.bench_function("prefix_cursor_10k_queries", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            for i in 0..N {
                let query = format!("key{i:08}suffix");
                let mut cursor = trie.prefix(query.as_bytes());
                while let Some(hit) = cursor.next().unwrap() {
                    hits += criterion::black_box(hit.length);
                }
            }
            hits
        });
    });
}

fn reload_from_bytes(c: &mut Criterion) {
    let records: Vec<Record<u32>> = (0..N)
        .map(|i| Record::new(format!("key{i:08}"), i as u32))
        .collect();
    let mut builder = Builder::<u32>::new();
    builder.build(&records).unwrap();
    let bytes = builder.write_to_bytes().unwrap();

    c.bench_function("load_10k_keys_from_bytes", |b| {
        b.iter(|| {
            let (trie, _) = Trie::<u32>::from_bytes(criterion::black_box(&bytes)).unwrap();
            criterion::black_box(trie.len())
        });
    });
}

criterion_group!(
    benches,
    exact_match_hits,
    exact_match_misses,
    prefix_cursor,
    reload_from_bytes,
);
criterion_main!(benches);
