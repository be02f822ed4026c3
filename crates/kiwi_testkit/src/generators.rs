//! Property-based test generators using proptest.
//!
//! Provides strategies for generating engine configurations and
//! operation sequences over a bounded key space.

use crate::fixtures::{TestKey, TestValue};
use kiwi_core::EngineConfig;
use proptest::prelude::*;

/// A single engine operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOperation {
    /// Write a value
    Put {
        /// Key
        key: TestKey,
        /// Value
        value: TestValue,
    },
    /// Remove a key
    Remove {
        /// Key
        key: TestKey,
    },
    /// Read a key
    Get {
        /// Key
        key: TestKey,
    },
    /// Scan an inclusive range
    Scan {
        /// Lower bound
        min: TestKey,
        /// Upper bound
        max: TestKey,
    },
    /// Rebalance every segment
    Compact,
}

/// Strategy for generating keys below `key_space`.
pub fn key_strategy(key_space: TestKey) -> impl Strategy<Value = TestKey> {
    0..key_space.max(1)
}

/// Strategy for generating engine operations.
pub fn engine_operation_strategy(key_space: TestKey) -> impl Strategy<Value = EngineOperation> {
    prop_oneof![
        6 => (key_strategy(key_space), any::<TestValue>())
            .prop_map(|(key, value)| EngineOperation::Put { key, value }),
        2 => key_strategy(key_space).prop_map(|key| EngineOperation::Remove { key }),
        3 => key_strategy(key_space).prop_map(|key| EngineOperation::Get { key }),
        2 => (key_strategy(key_space), key_strategy(key_space)).prop_map(|(a, b)| {
            EngineOperation::Scan {
                min: a.min(b),
                max: a.max(b),
            }
        }),
        1 => Just(EngineOperation::Compact),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    key_space: TestKey,
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<EngineOperation>> {
    prop::collection::vec(engine_operation_strategy(key_space), min_ops..max_ops)
}

/// Strategy for generating small, valid engine configurations.
///
/// Capacities are kept low so that short sequences already split and
/// merge segments.
pub fn engine_config_strategy() -> impl Strategy<Value = EngineConfig> {
    (4usize..32, 1usize..4, 0usize..8).prop_map(|(capacity, rebalance, pool)| {
        EngineConfig::new()
            .segment_capacity(capacity)
            .rebalance_size(rebalance)
            .pool_size(pool)
            .track_size_bounds(true)
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelChecker;
    use kiwi_core::Engine;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn keys_stay_in_space(key in key_strategy(50)) {
            prop_assert!(key < 50);
        }

        #[test]
        fn scans_are_ordered(op in engine_operation_strategy(50)) {
            if let EngineOperation::Scan { min, max } = op {
                prop_assert!(min <= max);
            }
        }

        #[test]
        fn generated_configs_validate(config in engine_config_strategy()) {
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn sequences_match_model(
            config in engine_config_strategy(),
            ops in operation_sequence_strategy(64, 1, 200),
        ) {
            let engine: Engine<TestKey, TestValue> = Engine::new(config).unwrap();
            let worker = engine.worker().unwrap();
            let mut checker = ModelChecker::new();
            for op in &ops {
                checker.apply(&worker, op);
            }
            checker.verify_all(&worker);
            prop_assert_eq!(engine.count_keys(), checker.tracked_count());
        }
    }
}
