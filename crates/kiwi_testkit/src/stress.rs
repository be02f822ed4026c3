//! Stress tests for KiWi.
//!
//! These runners drive an engine under heavy load and concurrent access.
//! Every value written encodes its key (`value % key_space == key`), which
//! lets reads and scans validate what they observe; an observation that
//! breaks the encoding or the scan ordering counts as a failed operation.

use crate::fixtures::{TestKey, TestValue};
use kiwi_core::{Engine, Worker};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Number of distinct keys.
    pub key_space: u64,
    /// Width of the key range covered by each scan.
    pub scan_span: u64,
    /// Seed for the per-thread random generators.
    pub seed: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            key_space: 1_000,
            scan_span: 100,
            seed: 42,
        }
    }
}

impl StressConfig {
    fn key_space(&self) -> u64 {
        self.key_space.max(1)
    }

    /// Value written for `key` by the `round`-th write.
    pub fn encode(&self, key: TestKey, round: u64) -> TestValue {
        round * self.key_space() + key
    }

    /// Returns true if `value` is a value this configuration writes for `key`.
    pub fn is_valid(&self, key: TestKey, value: TestValue) -> bool {
        value % self.key_space() == key
    }

    fn valid_scan(&self, min: TestKey, max: TestKey, pairs: &[(TestKey, TestValue)]) -> bool {
        pairs.windows(2).all(|pair| pair[0].0 < pair[1].0)
            && pairs
                .iter()
                .all(|&(key, value)| key >= min && key <= max && self.is_valid(key, value))
    }
}

/// Counts outcomes of one runner, shared between its threads.
#[derive(Debug, Default)]
struct Tally {
    successful: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn record(&self, ok: bool) {
        if ok {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn fail(&self, count: usize) {
        self.failed.fetch_add(count, Ordering::Relaxed);
    }

    fn finish(&self, start: Instant) -> StressTestResult {
        StressTestResult::new(
            self.successful.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            start.elapsed(),
        )
    }
}

fn populate(worker: &Worker<'_, TestKey, TestValue>, config: &StressConfig) {
    for key in 0..config.key_space() {
        worker.put(key, config.encode(key, 0));
    }
}

fn verify_get(
    worker: &Worker<'_, TestKey, TestValue>,
    config: &StressConfig,
    key: TestKey,
) -> bool {
    worker
        .get(&key)
        .map_or(true, |value| config.is_valid(key, value))
}

fn verify_scan(
    worker: &Worker<'_, TestKey, TestValue>,
    config: &StressConfig,
    min: TestKey,
) -> bool {
    let max = min.saturating_add(config.scan_span);
    let pairs = worker.scan(&min, &max);
    config.valid_scan(min, max, &pairs)
}

/// Runs `per_thread` on `config.threads` threads, each with its own worker
/// and random generator.
fn run_concurrent<F>(
    engine: &Engine<TestKey, TestValue>,
    config: &StressConfig,
    per_thread: F,
) -> StressTestResult
where
    F: Fn(&Worker<'_, TestKey, TestValue>, &mut StdRng, usize, &Tally) + Sync,
{
    let threads = config.threads.max(1);
    let ops_per_thread = config.operations / threads;
    let tally = Tally::default();
    let start = Instant::now();

    thread::scope(|s| {
        for t in 0..threads {
            let tally = &tally;
            let per_thread = &per_thread;
            s.spawn(move || match engine.worker() {
                Ok(worker) => {
                    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(t as u64));
                    per_thread(&worker, &mut rng, ops_per_thread, tally);
                }
                Err(_) => tally.fail(ops_per_thread),
            });
        }
    });

    tally.finish(start)
}

/// Run a sequential write stress test.
pub fn stress_sequential_writes(
    engine: &Engine<TestKey, TestValue>,
    config: &StressConfig,
) -> StressTestResult {
    let start = Instant::now();
    let Ok(worker) = engine.worker() else {
        return StressTestResult::new(0, config.operations, start.elapsed());
    };

    for i in 0..config.operations as u64 {
        let key = i % config.key_space();
        worker.put(key, config.encode(key, i / config.key_space()));
    }

    StressTestResult::new(config.operations, 0, start.elapsed())
}

/// Run a sequential read stress test.
pub fn stress_sequential_reads(
    engine: &Engine<TestKey, TestValue>,
    config: &StressConfig,
) -> StressTestResult {
    let start = Instant::now();
    let Ok(worker) = engine.worker() else {
        return StressTestResult::new(0, config.operations, start.elapsed());
    };

    // First, populate the engine
    populate(&worker, config);

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations as u64 {
        let key = i % config.key_space();
        match worker.get(&key) {
            Some(value) if config.is_valid(key, value) => successful += 1,
            _ => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a mixed write/read/remove/scan stress test on a single worker.
pub fn stress_mixed_operations(
    engine: &Engine<TestKey, TestValue>,
    config: &StressConfig,
) -> StressTestResult {
    let start = Instant::now();
    let Ok(worker) = engine.worker() else {
        return StressTestResult::new(0, config.operations, start.elapsed());
    };

    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations as u64 {
        let key = i % config.key_space();
        let ok = match i % 4 {
            0 => {
                worker.put(key, config.encode(key, i));
                true
            }
            1 => verify_get(&worker, config, key),
            2 => {
                worker.remove(key);
                true
            }
            _ => verify_scan(&worker, config, key),
        };
        if ok {
            successful += 1;
        } else {
            failed += 1;
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a concurrent write stress test over a shared key space.
pub fn stress_concurrent_writes(
    engine: &Engine<TestKey, TestValue>,
    config: &StressConfig,
) -> StressTestResult {
    run_concurrent(engine, config, |worker, rng, ops, tally| {
        for round in 0..ops as u64 {
            let key = rng.gen_range(0..config.key_space());
            worker.put(key, config.encode(key, round));
            tally.record(true);
        }
    })
}

/// Run a concurrent read stress test.
pub fn stress_concurrent_reads(
    engine: &Engine<TestKey, TestValue>,
    config: &StressConfig,
) -> StressTestResult {
    // Populate engine first
    if let Ok(worker) = engine.worker() {
        populate(&worker, config);
    }

    run_concurrent(engine, config, |worker, rng, ops, tally| {
        for _ in 0..ops {
            let key = rng.gen_range(0..config.key_space());
            tally.record(worker.get(&key).is_some_and(|value| config.is_valid(key, value)));
        }
    })
}

/// Run a concurrent stress test mixing writes, removes, reads and scans.
pub fn stress_concurrent_mixed(
    engine: &Engine<TestKey, TestValue>,
    config: &StressConfig,
) -> StressTestResult {
    run_concurrent(engine, config, |worker, rng, ops, tally| {
        for round in 0..ops as u64 {
            let key = rng.gen_range(0..config.key_space());
            let ok = match rng.gen_range(0..10) {
                0..=4 => {
                    worker.put(key, config.encode(key, round));
                    true
                }
                5 => {
                    worker.remove(key);
                    true
                }
                6..=8 => verify_get(worker, config, key),
                _ => verify_scan(worker, config, key),
            };
            tally.record(ok);
        }
    })
}

/// Run concurrent writers while one extra thread compacts the engine.
pub fn stress_compaction(
    engine: &Engine<TestKey, TestValue>,
    config: &StressConfig,
) -> StressTestResult {
    let compactions = AtomicUsize::new(0);
    let done = AtomicBool::new(false);
    let result = thread::scope(|s| {
        s.spawn(|| {
            while !done.load(Ordering::Acquire) {
                engine.compact_all();
                compactions.fetch_add(1, Ordering::Relaxed);
            }
        });
        let result = stress_concurrent_mixed(engine, config);
        done.store(true, Ordering::Release);
        result
    });

    let compacted = compactions.load(Ordering::Relaxed);
    StressTestResult::new(
        result.successful_ops + compacted,
        result.failed_ops,
        result.duration,
    )
}


