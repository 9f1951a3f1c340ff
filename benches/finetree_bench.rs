use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crossbeam_utils::thread;
use finetree::{find_exact_portable, FineTree, LaneKey, TreeConfig};
use rand::prelude::SliceRandom;
use rand::thread_rng;
use std::time::{Duration, Instant};

#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

fn tree_with_leaf(leaf_capacity: usize) -> FineTree<u64, u64> {
    FineTree::with_config(
        0,
        TreeConfig::default().with_leaf_capacity(leaf_capacity as u16),
    )
}

fn shuffled_keys(count: u64) -> Vec<u64> {
    let mut keys: Vec<u64> = (0..count).collect();
    keys.shuffle(&mut thread_rng());
    keys
}

/// Run `op` for each key, keys are evenly distributed between threads.
fn run_concurrently<F>(keys: &[u64], threads: usize, op: F) -> Duration
where
    F: Fn(u64) + Sync,
{
    let per_thread_kv = keys.len() / threads + 1;
    let op = &op;
    let start = thread::scope(|scope| {
        for chunk in keys.chunks(per_thread_kv) {
            scope.spawn(move |_| {
                for key in chunk {
                    op(*key);
                }
            });
        }
        Instant::now()
    })
    .unwrap();
    start.elapsed()
}

pub fn concurrent(c: &mut Criterion) {
    let threads: usize = std::cmp::max(num_cpus::get().saturating_sub(2), 1);

    let mut group = c.benchmark_group("concurrent");
    group.throughput(Throughput::Elements(1));
    for leaf_capacity in (64..=256).step_by(64) {
        group.bench_with_input(
            BenchmarkId::new("insert", leaf_capacity),
            &leaf_capacity,
            |b, capacity| {
                let tree = &tree_with_leaf(*capacity);
                b.iter_custom(|iters| {
                    let keys = shuffled_keys(iters);
                    run_concurrently(&keys, threads, |key| {
                        tree.insert(key, key).unwrap();
                    })
                })
            },
        );
    }

    for leaf_capacity in (64..=256).step_by(64) {
        group.bench_with_input(
            BenchmarkId::new("get", leaf_capacity),
            &leaf_capacity,
            |b, capacity| {
                let tree = &tree_with_leaf(*capacity);
                b.iter_custom(|iters| {
                    let keys = shuffled_keys(iters);
                    for key in &keys {
                        tree.insert(*key, *key).unwrap();
                    }
                    run_concurrently(&keys, threads, |key| {
                        black_box(tree.get(&key).unwrap());
                    })
                })
            },
        );
    }

    for leaf_capacity in (64..=256).step_by(64) {
        group.bench_with_input(
            BenchmarkId::new("delete", leaf_capacity),
            &leaf_capacity,
            |b, capacity| {
                let tree = &tree_with_leaf(*capacity);
                b.iter_custom(|iters| {
                    let keys = shuffled_keys(iters);
                    for key in &keys {
                        tree.insert(*key, *key).unwrap();
                    }
                    run_concurrently(&keys, threads, |key| {
                        tree.delete(&key).unwrap();
                    })
                })
            },
        );
    }
    group.finish();
}

pub fn single_threaded(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    group.throughput(Throughput::Elements(1));
    for leaf_capacity in (64..=256).step_by(64) {
        group.bench_with_input(
            BenchmarkId::new("leaf_capacity", leaf_capacity),
            &leaf_capacity,
            |b, capacity| {
                let tree = tree_with_leaf(*capacity);
                let mut key = 0;
                b.iter(|| {
                    tree.insert(key, key).unwrap();
                    key += 1;
                })
            },
        );
    }
    group.finish();

    let mut group = c.benchmark_group("delete");
    for leaf_capacity in (64..=256).step_by(64) {
        group.bench_with_input(
            BenchmarkId::new("leaf_capacity", leaf_capacity),
            &leaf_capacity,
            |b, capacity| {
                let tree = tree_with_leaf(*capacity);
                b.iter_custom(|iters| {
                    for i in 0..iters {
                        tree.insert(i, i).unwrap();
                    }
                    let start = Instant::now();
                    for i in 0..iters {
                        tree.delete(&i).unwrap();
                    }
                    start.elapsed()
                })
            },
        );
    }
    group.finish();

    let mut group = c.benchmark_group("get");
    for leaf_capacity in (64..=256).step_by(64) {
        group.bench_with_input(
            BenchmarkId::new("leaf_capacity", leaf_capacity),
            &leaf_capacity,
            |b, capacity| {
                let tree = tree_with_leaf(*capacity);
                b.iter_custom(|iters| {
                    for i in 0..iters {
                        tree.insert(i, i).unwrap();
                    }
                    let start = Instant::now();
                    for i in 0..iters {
                        black_box(tree.get(&i).unwrap());
                    }
                    start.elapsed()
                })
            },
        );
    }
    group.finish();
}

pub fn leaf_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("leaf_scan");
    for len in [16usize, 64, 256] {
        let mut keys: Vec<u64> = (0..len as u64).collect();
        keys.shuffle(&mut thread_rng());
        let target = (len - 1) as u64;

        group.bench_with_input(BenchmarkId::new("dispatch", len), &keys, |b, keys| {
            b.iter(|| u64::find_exact(black_box(keys), black_box(target)))
        });
        group.bench_with_input(BenchmarkId::new("portable", len), &keys, |b, keys| {
            b.iter(|| find_exact_portable::<u64, 4>(black_box(keys), black_box(target)))
        });
        group.bench_with_input(BenchmarkId::new("scalar", len), &keys, |b, keys| {
            b.iter(|| black_box(keys).iter().position(|key| *key == black_box(target)))
        });
    }
    group.finish();
}

criterion_group!(st, single_threaded);
criterion_group!(conc, concurrent);
criterion_group!(scan, leaf_scan);
criterion_main!(st, conc, scan);
