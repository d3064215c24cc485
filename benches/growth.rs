//! Wallclock microbenchmarks for array growth and tree insertion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dynarray::{ArrayParams, DynArray, HashTree};

const APPENDS: u64 = 100_000;

fn append_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Elements(APPENDS));
    for growth in [1.5_f32, 2.0] {
        for capacity in [1_usize, 10, 1_000] {
            let params = ArrayParams::default()
                .with_growth(growth)
                .with_capacity(capacity);
            group.bench_with_input(
                BenchmarkId::new(format!("growth-{growth}"), capacity),
                &params,
                |b, params| {
                    b.iter(|| {
                        let mut array = DynArray::<u64>::with_params(params.clone())
                            .unwrap_or_default();
                        for value in 0..APPENDS {
                            array.append(black_box(value));
                        }
                        array.len()
                    })
                },
            );
        }
    }
    group.finish();
}

fn tree_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree");
    for count in [1_000_u64, 10_000] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("insert", count), &count, |b, &count| {
            b.iter(|| {
                let mut tree = HashTree::<u64, u64>::new(u64::cmp);
                for key in 0..count {
                    tree.set(black_box(key), key);
                }
                tree.len()
            })
        });
        group.bench_with_input(BenchmarkId::new("insert-balance", count), &count, |b, &count| {
            b.iter(|| {
                let mut tree = HashTree::<u64, u64>::new(u64::cmp);
                for key in 0..count {
                    tree.set(black_box(key), key);
                }
                tree.balance();
                tree.max_depth(tree.root())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, append_growth, tree_insert);
criterion_main!(benches);
