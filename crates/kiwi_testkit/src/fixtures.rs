//! Test fixtures and engine helpers.
//!
//! Provides convenience functions for setting up test engines
//! and common test scenarios.

use kiwi_core::{Engine, EngineConfig};

/// Key type used by the fixtures.
pub type TestKey = u64;

/// Value type used by the fixtures.
pub type TestValue = u64;

/// A test engine over `u64` keys and values.
pub struct TestEngine {
    /// The engine instance.
    pub engine: Engine<TestKey, TestValue>,
}

impl TestEngine {
    /// Creates a test engine with size bounds enabled.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: Engine::new(config).expect("Failed to create engine"),
        }
    }

    /// Creates a test engine with the default configuration.
    pub fn default_sized() -> Self {
        Self::new(EngineConfig::default().track_size_bounds(true))
    }

    /// Creates a test engine whose segments split after a handful of writes.
    pub fn small() -> Self {
        Self::new(small_config())
    }
}

impl std::ops::Deref for TestEngine {
    type Target = Engine<TestKey, TestValue>;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

impl std::ops::DerefMut for TestEngine {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.engine
    }
}

/// Configuration with 16-entry segments, a small pool and size bounds.
pub fn small_config() -> EngineConfig {
    EngineConfig::new()
        .segment_capacity(16)
        .pool_size(8)
        .track_size_bounds(true)
}

/// Creates a test engine with small segments.
pub fn small_engine() -> TestEngine {
    TestEngine::small()
}

/// Runs a test with a fresh engine with small segments.
///
/// # Example
///
/// ```rust
/// use kiwi_testkit::with_engine;
///
/// let live = with_engine(|engine| {
///     let worker = engine.worker().unwrap();
///     for key in 0..100 {
///         worker.put(key, key);
///     }
///     engine.count_keys()
/// });
/// assert_eq!(live, 100);
/// ```
pub fn with_engine<F, R>(f: F) -> R
where
    F: FnOnce(&Engine<TestKey, TestValue>) -> R,
{
    let test_engine = TestEngine::small();
    f(&test_engine.engine)
}

/// Runs a mutable test with a fresh engine with small segments.
pub fn with_engine_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut Engine<TestKey, TestValue>) -> R,
{
    let mut test_engine = TestEngine::small();
    f(&mut test_engine.engine)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::{rngs::StdRng, SeedableRng};

    /// Creates an engine holding keys `0..key_count`, each mapped to itself.
    pub fn populated_engine(key_count: u64) -> TestEngine {
        let test_engine = TestEngine::small();
        {
            let worker = test_engine.worker().expect("Failed to claim worker");
            for key in 0..key_count {
                worker.put(key, key);
            }
        }
        test_engine
    }

    /// Creates an engine whose keys were written in shuffled order, several
    /// times each, and then partly removed.
    ///
    /// The surviving keys are the ones not divisible by 4; each maps to
    /// `key * 10 + versions - 1`.
    pub fn fragmented_engine(key_count: u64, versions: u64, seed: u64) -> TestEngine {
        let test_engine = TestEngine::small();
        {
            let worker = test_engine.worker().expect("Failed to claim worker");
            let mut rng = StdRng::seed_from_u64(seed);
            let mut keys: Vec<_> = (0..key_count).collect();
            for version in 0..versions {
                keys.shuffle(&mut rng);
                for &key in &keys {
                    worker.put(key, key * 10 + version);
                }
            }
            for key in (0..key_count).step_by(4) {
                worker.remove(key);
            }
        }
        test_engine
    }
}


