/* Benchmarks adapted from the `flurry_dashmap` suite this crate started
 * from, retargeted at concurrent Set/Get throughput through the TinyLFU
 * admission path rather than raw map insertion.
 */

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rayon::prelude::*;

use ferrolfu::Cache;

const ITER: u64 = 32 * 1024;

fn task_insert_u64_u64(cache: &Cache<u64, u64>) {
    (0..ITER).into_par_iter().for_each(|i| {
        cache.set(i, i + 7);
    });
}

fn insert_u64_u64(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_u64_u64");
    group.throughput(Throughput::Elements(ITER));
    let max = num_cpus::get();

    for threads in 1..=max {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap();
            pool.install(|| {
                b.iter(|| {
                    let cache = Cache::new();
                    task_insert_u64_u64(&cache);
                    cache.wait();
                });
            });
        });
    }

    group.finish();
}

fn get_u64_u64(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_u64_u64");
    group.throughput(Throughput::Elements(ITER));
    let max = num_cpus::get();

    for threads in 1..=max {
        let cache = Arc::new(Cache::new());
        task_insert_u64_u64(&cache);
        cache.wait();

        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap();
            let cache = cache.clone();
            pool.install(|| {
                b.iter(|| {
                    (0..ITER).into_par_iter().for_each(|i| {
                        cache.get(&i);
                    });
                });
            });
        });
    }

    group.finish();
}

criterion_group!(benches, insert_u64_u64, get_u64_u64);
criterion_main!(benches);
