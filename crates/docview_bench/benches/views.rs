//! View indexing and query benchmarks.

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use docview_bench::{generate_sales, sales_map};
use docview_core::{reducers, Config, Database, IndexUpdateMode, QueryOptions, View};
use docview_storage::MemoryStore;
use serde_json::json;
use std::sync::Arc;

/// Open a database over a store seeded with `count` sales documents.
fn seeded(count: usize) -> (Database, Arc<MemoryStore>, View) {
    let store = Arc::new(MemoryStore::new());
    for (id, body) in generate_sales(count, 16) {
        store.put(&id, body).unwrap();
    }
    let db = Database::open(store.clone(), Config::default()).unwrap();
    let view = db.view("sales").unwrap();
    view.set_map_reduce(sales_map(), Some(reducers::sum()), "1")
        .unwrap();
    (db, store, view)
}

/// Benchmark building an index from scratch.
fn bench_initial_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("initial_build");
    group.sample_size(20);

    for count in [100, 1000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter_batched(
                || seeded(count),
                |(_db, _store, view)| {
                    black_box(view.update_index().unwrap());
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

/// Benchmark catching up after a single document write.
fn bench_incremental_update(c: &mut Criterion) {
    let (_db, store, view) = seeded(10_000);
    view.update_index().unwrap();
    let mut next = 0u64;

    c.bench_function("incremental_update", |b| {
        b.iter(|| {
            next += 1;
            store
                .put(&format!("new{next}"), json!({"type": "type0", "amount": 1}))
                .unwrap();
            black_box(view.update_index().unwrap());
        });
    });
}

/// Benchmark queries against an up-to-date index.
fn bench_queries(c: &mut Criterion) {
    let (_db, _store, view) = seeded(10_000);
    view.update_index().unwrap();
    let mut group = c.benchmark_group("query");

    let cases = [
        ("reduce_all", QueryOptions::new()),
        ("group", QueryOptions::new().group(true)),
        (
            "range_map",
            QueryOptions::new()
                .reduce(false)
                .start_key(json!("type3"))
                .end_key(json!("type5")),
        ),
        (
            "keys_map",
            QueryOptions::new()
                .reduce(false)
                .keys(vec![json!("type1"), json!("type7"), json!("type11")]),
        ),
        (
            "descending_limit",
            QueryOptions::new().reduce(false).descending(true).limit(100),
        ),
    ];

    for (name, options) in cases {
        let query = view
            .create_query()
            .with_options(options.index_update_mode(IndexUpdateMode::Never));
        group.bench_function(name, |b| {
            b.iter(|| black_box(query.run().unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_initial_build,
    bench_incremental_update,
    bench_queries
);
criterion_main!(benches);
