//! Multi-threaded behavior of the engine.
//!
//! Small segments keep rebalances frequent so that splits, merges and
//! staged-write reconciliation all race the operations under test.

use kiwi_core::{Engine, EngineConfig, Version};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

fn small_engine() -> Engine<u64, u64> {
    let config = EngineConfig::new()
        .segment_capacity(16)
        .pool_size(8)
        .track_size_bounds(true);
    Engine::new(config).expect("valid config")
}

#[test]
fn disjoint_writers_keep_every_key() {
    let engine = small_engine();
    let threads = 4u64;
    let per_thread = 2_000u64;

    thread::scope(|s| {
        for t in 0..threads {
            let engine = &engine;
            s.spawn(move || {
                let worker = engine.worker().unwrap();
                for i in 0..per_thread {
                    let key = i * threads + t;
                    worker.put(key, key * 10);
                }
            });
        }
    });

    let total = threads * per_thread;
    let worker = engine.worker().unwrap();
    let all = worker.scan(&0, &u64::MAX);
    assert_eq!(all.len() as u64, total);
    for (expected, (key, value)) in all.iter().enumerate() {
        assert_eq!(*key, expected as u64);
        assert_eq!(*value, key * 10);
    }
    assert_eq!(engine.count_keys() as u64, total);
    assert!(engine.stats().splits() > 0);
}

#[test]
fn same_key_puts_leave_highest_version_visible() {
    let engine = small_engine();
    let threads = 4u64;
    let per_thread = 500u64;

    let results: Vec<Vec<(Version, u64)>> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let engine = &engine;
                s.spawn(move || {
                    let worker = engine.worker().unwrap();
                    (0..per_thread)
                        .map(|i| {
                            let value = t * per_thread + i;
                            (worker.put(7, value), value)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    let mut versions: Vec<_> = results.iter().flatten().map(|(v, _)| *v).collect();
    versions.sort();
    versions.dedup();
    assert_eq!(versions.len() as u64, threads * per_thread, "versions are unique");

    let (_, winner) = results
        .iter()
        .flatten()
        .max_by_key(|(version, _)| *version)
        .copied()
        .unwrap();
    let worker = engine.worker().unwrap();
    assert_eq!(worker.get(&7), Some(winner));
    assert_eq!(worker.scan(&7, &7), vec![(7, winner)]);
}

#[test]
fn reads_of_one_key_are_monotonic() {
    let engine = small_engine();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let engine_ref = &engine;
        let done_ref = &done;
        s.spawn(move || {
            let worker = engine_ref.worker().unwrap();
            for value in 1..=5_000u64 {
                worker.put(42, value);
                // Neighbouring keys keep the owning segment splitting.
                worker.put(value % 64, value);
            }
            done_ref.store(true, Ordering::Release);
        });

        for _ in 0..2 {
            s.spawn(move || {
                let worker = engine_ref.worker().unwrap();
                let mut last = 0;
                while !done_ref.load(Ordering::Acquire) {
                    if let Some(value) = worker.get(&42) {
                        assert!(value >= last, "read {value} after {last}");
                        last = value;
                    }
                }
            });
        }
    });

    assert_eq!(engine.worker().unwrap().get(&42), Some(5_000));
}

#[test]
fn scans_observe_a_prefix_of_ordered_inserts() {
    let engine = small_engine();
    let total = 4_000u64;
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let engine_ref = &engine;
        let done_ref = &done;
        s.spawn(move || {
            let worker = engine_ref.worker().unwrap();
            for key in 0..total {
                worker.put(key, key);
            }
            done_ref.store(true, Ordering::Release);
        });

        for _ in 0..2 {
            s.spawn(move || {
                let worker = engine_ref.worker().unwrap();
                let mut longest = 0;
                while !done_ref.load(Ordering::Acquire) {
                    let pairs = worker.scan(&0, &total);
                    for (index, (key, value)) in pairs.iter().enumerate() {
                        assert_eq!(*key, index as u64, "scan skipped or repeated a key");
                        assert_eq!(key, value);
                    }
                    assert!(pairs.len() >= longest, "scan went backwards");
                    longest = pairs.len();
                }
            });
        }
    });

    let worker = engine.worker().unwrap();
    assert_eq!(worker.scan(&0, &total).len() as u64, total);
}

#[test]
fn scans_stay_ordered_under_random_writes() {
    let engine = small_engine();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let engine_ref = &engine;
        let done_ref = &done;
        for seed in 0..3u64 {
            s.spawn(move || {
                let worker = engine_ref.worker().unwrap();
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..3_000 {
                    let key = rng.gen_range(0..512);
                    if rng.gen_bool(0.25) {
                        worker.remove(key);
                    } else {
                        worker.put(key, key);
                    }
                }
            });
        }

        s.spawn(move || {
            let worker = engine_ref.worker().unwrap();
            for _ in 0..200 {
                let pairs = worker.scan(&100, &400);
                assert!(pairs.windows(2).all(|w| w[0].0 < w[1].0));
                assert!(pairs.iter().all(|(k, v)| (100..=400).contains(k) && k == v));
            }
            done_ref.store(true, Ordering::Release);
        });
    });

    assert!(done.load(Ordering::Acquire));
    let live = engine.count_keys();
    assert!(engine.size_lower_bound() <= live);
    assert!(live <= engine.size_upper_bound());
}

#[test]
fn bounds_bracket_after_concurrent_compaction() {
    let engine = small_engine();

    thread::scope(|s| {
        for seed in 0..4u64 {
            let engine = &engine;
            s.spawn(move || {
                let worker = engine.worker().unwrap();
                let mut rng = StdRng::seed_from_u64(100 + seed);
                for round in 0..2_000 {
                    let key = rng.gen_range(0..256);
                    if rng.gen_bool(0.3) {
                        worker.remove(key);
                    } else {
                        worker.put(key, round);
                    }
                }
            });
        }
        let engine = &engine;
        s.spawn(move || {
            for _ in 0..20 {
                engine.compact_all();
            }
        });
    });

    engine.compact_all();
    let live = engine.count_keys();
    assert_eq!(engine.size_lower_bound(), live);
    assert_eq!(engine.size_upper_bound(), live);
    assert_eq!(engine.count_duplicate_keys(), 0);
}

#[test]
fn scans_keep_their_snapshot_while_compaction_drops_versions() {
    let engine = small_engine();
    let span = 200u64;
    {
        let worker = engine.worker().unwrap();
        for key in 0..span {
            worker.put(key, 0);
        }
    }
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let (engine, done) = (&engine, &done);
        s.spawn(move || {
            let worker = engine.worker().unwrap();
            let mut rng = StdRng::seed_from_u64(17);
            for round in 1..=3_000u64 {
                worker.put(0, round);
                for _ in 0..4 {
                    worker.put(rng.gen_range(1..span - 1), round);
                }
                worker.put(span - 1, round);
            }
            done.store(true, Ordering::SeqCst);
        });
        s.spawn(move || {
            while !done.load(Ordering::SeqCst) {
                engine.compact_all();
            }
        });
        for _ in 0..2 {
            s.spawn(move || {
                let worker = engine.worker().unwrap();
                while !done.load(Ordering::SeqCst) {
                    let pairs = worker.scan(&0, &(span - 1));
                    assert_eq!(pairs.len(), span as usize, "scan lost keys");
                    let first = pairs[0].1;
                    let last = pairs[pairs.len() - 1].1;
                    assert!(
                        first == last || first == last + 1,
                        "scan mixed rounds {first} and {last}"
                    );
                }
            });
        }
    });
}

#[test]
fn workers_are_reusable_across_threads() {
    let config = EngineConfig::new().segment_capacity(32).max_workers(2);
    let engine: Engine<u64, u64> = Engine::new(config).unwrap();

    for round in 0..8u64 {
        thread::scope(|s| {
            for t in 0..2u64 {
                let engine = &engine;
                s.spawn(move || {
                    let worker = engine.worker().unwrap();
                    worker.put(round * 2 + t, round);
                });
            }
        });
        assert_eq!(engine.active_workers(), 0);
    }
    assert_eq!(engine.count_keys(), 16);
}
