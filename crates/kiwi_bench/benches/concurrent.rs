//! Multi-threaded benchmarks.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kiwi_bench::utils::{engine, populated_engine, random_keys};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

const OPS_PER_THREAD: usize = 10_000;

/// Benchmark writers contending on a shared key space.
fn bench_contended_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_put");
    group.sample_size(20);

    for threads in [1usize, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements((threads * OPS_PER_THREAD) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(threads),
            threads,
            |b, &threads| {
                let keys: Vec<_> = (0..threads)
                    .map(|_| random_keys(OPS_PER_THREAD, 50_000))
                    .collect();

                b.iter(|| {
                    let engine = engine(4500);
                    thread::scope(|s| {
                        for thread_keys in &keys {
                            let engine = &engine;
                            s.spawn(move || {
                                let worker = engine.worker().unwrap();
                                for &key in thread_keys {
                                    worker.put(key, key);
                                }
                            });
                        }
                    });
                });
            },
        );
    }
    group.finish();
}

/// Benchmark readers running alongside one writer.
fn bench_get_under_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_under_writes");
    group.sample_size(20);
    let key_count = 50_000u64;

    for readers in [1usize, 3, 7].iter() {
        group.throughput(Throughput::Elements((readers * OPS_PER_THREAD) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(readers),
            readers,
            |b, &readers| {
                let engine = populated_engine(4500, key_count);
                let lookups = random_keys(OPS_PER_THREAD, key_count);

                b.iter(|| {
                    let done = AtomicBool::new(false);
                    thread::scope(|s| {
                        let engine = &engine;
                        let done = &done;
                        s.spawn(move || {
                            let worker = engine.worker().unwrap();
                            let mut key = 0;
                            while !done.load(Ordering::Relaxed) {
                                worker.put(key % key_count, key);
                                key += 1;
                            }
                        });

                        let handles: Vec<_> = (0..readers)
                            .map(|_| {
                                let lookups = &lookups;
                                s.spawn(move || {
                                    let worker = engine.worker().unwrap();
                                    lookups.iter().filter_map(|key| worker.get(key)).count()
                                })
                            })
                            .collect();
                        for handle in handles {
                            let _ = handle.join();
                        }
                        done.store(true, Ordering::Relaxed);
                    });
                });
            },
        );
    }
    group.finish();
}

/// Benchmark full scans racing writers that keep splitting segments.
fn bench_scan_under_splits(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_under_splits");
    group.sample_size(10);

    for writers in [1usize, 3].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(writers),
            writers,
            |b, &writers| {
                b.iter(|| {
                    let engine = engine(256);
                    let done = AtomicBool::new(false);
                    thread::scope(|s| {
                        let engine = &engine;
                        let done = &done;
                        let handles: Vec<_> = (0..writers as u64)
                            .map(|t| {
                                s.spawn(move || {
                                    let worker = engine.worker().unwrap();
                                    for i in 0..OPS_PER_THREAD as u64 {
                                        worker.put(i * writers as u64 + t, i);
                                    }
                                })
                            })
                            .collect();
                        s.spawn(move || {
                            let worker = engine.worker().unwrap();
                            while !done.load(Ordering::Relaxed) {
                                worker.scan(&0, &u64::MAX);
                            }
                        });
                        for handle in handles {
                            let _ = handle.join();
                        }
                        done.store(true, Ordering::Relaxed);
                    });
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_contended_put,
    bench_get_under_writes,
    bench_scan_under_splits,
);
criterion_main!(benches);
