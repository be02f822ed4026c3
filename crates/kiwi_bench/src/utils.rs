//! Benchmark utilities.

use kiwi_core::{Engine, EngineConfig};
use rand::seq::SliceRandom;
use rand::Rng;

/// Engine type used by every benchmark.
pub type BenchEngine = Engine<u64, u64>;

/// Creates an engine with the given segment capacity and a warm pool.
pub fn engine(segment_capacity: usize) -> BenchEngine {
    let config = EngineConfig::new()
        .segment_capacity(segment_capacity)
        .pool_size(16);
    Engine::new(config).expect("valid benchmark config")
}

/// Generate `count` distinct keys in random order.
pub fn shuffled_keys(count: u64) -> Vec<u64> {
    let mut keys: Vec<u64> = (0..count).collect();
    keys.shuffle(&mut rand::thread_rng());
    keys
}

/// Generate `count` random keys below `key_space`.
pub fn random_keys(count: usize, key_space: u64) -> Vec<u64> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| rng.gen_range(0..key_space)).collect()
}

/// Creates an engine holding keys `0..count` written in random order.
pub fn populated_engine(segment_capacity: usize, count: u64) -> BenchEngine {
    let engine = engine(segment_capacity);
    {
        let worker = engine.worker().expect("worker slot available");
        for key in shuffled_keys(count) {
            worker.put(key, key);
        }
    }
    engine
}
