//! Model-based verification helpers.
//!
//! Mirrors every operation into a `BTreeMap` and checks that the engine
//! answers reads and scans the same way.

use crate::fixtures::{TestKey, TestValue};
use crate::generators::EngineOperation;
use kiwi_core::Worker;
use std::collections::BTreeMap;

/// Tracks the expected content of an engine driven by one worker.
#[derive(Debug, Default)]
pub struct ModelChecker {
    model: BTreeMap<TestKey, TestValue>,
    applied: usize,
}

impl ModelChecker {
    /// Creates an empty checker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a value through `worker` and tracks it.
    pub fn put(&mut self, worker: &Worker<'_, TestKey, TestValue>, key: TestKey, value: TestValue) {
        worker.put(key, value);
        self.model.insert(key, value);
    }

    /// Removes a key through `worker` and updates tracking.
    pub fn remove(&mut self, worker: &Worker<'_, TestKey, TestValue>, key: TestKey) {
        worker.remove(key);
        self.model.remove(&key);
    }

    /// Reads a key and verifies it matches the tracked value.
    pub fn get_and_verify(
        &self,
        worker: &Worker<'_, TestKey, TestValue>,
        key: TestKey,
    ) -> Option<TestValue> {
        let actual = worker.get(&key);
        assert_eq!(
            actual,
            self.model.get(&key).copied(),
            "Value mismatch for key {key}"
        );
        actual
    }

    /// Scans `[min, max]` and verifies it matches the tracked range.
    pub fn scan_and_verify(
        &self,
        worker: &Worker<'_, TestKey, TestValue>,
        min: TestKey,
        max: TestKey,
    ) -> Vec<(TestKey, TestValue)> {
        let actual = worker.scan(&min, &max);
        let expected: Vec<_> = if min <= max {
            self.model
                .range(min..=max)
                .map(|(key, value)| (*key, *value))
                .collect()
        } else {
            Vec::new()
        };
        assert_eq!(actual, expected, "Scan mismatch for [{min}, {max}]");
        actual
    }

    /// Applies one generated operation, verifying reads and scans.
    pub fn apply(&mut self, worker: &Worker<'_, TestKey, TestValue>, op: &EngineOperation) {
        match *op {
            EngineOperation::Put { key, value } => self.put(worker, key, value),
            EngineOperation::Remove { key } => self.remove(worker, key),
            EngineOperation::Get { key } => {
                self.get_and_verify(worker, key);
            }
            EngineOperation::Scan { min, max } => {
                self.scan_and_verify(worker, min, max);
            }
            EngineOperation::Compact => worker.engine().compact_all(),
        }
        self.applied += 1;
    }

    /// Verifies every tracked key and the full-range scan.
    pub fn verify_all(&self, worker: &Worker<'_, TestKey, TestValue>) {
        for (key, expected) in &self.model {
            assert_eq!(
                worker.get(key).as_ref(),
                Some(expected),
                "Value mismatch for key {key}"
            );
        }
        self.scan_and_verify(worker, TestKey::MIN, TestKey::MAX);
    }

    /// Returns the number of live keys in the model.
    pub fn tracked_count(&self) -> usize {
        self.model.len()
    }

    /// Returns the number of operations applied.
    pub fn applied(&self) -> usize {
        self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::small_engine;

    #[test]
    fn test_model_checker() {
        let engine = small_engine();
        let worker = engine.worker().unwrap();
        let mut checker = ModelChecker::new();

        for key in 0..40 {
            checker.put(&worker, key, key * 2);
        }
        checker.remove(&worker, 7);
        checker.apply(&worker, &EngineOperation::Compact);

        assert_eq!(checker.get_and_verify(&worker, 8), Some(16));
        assert_eq!(checker.get_and_verify(&worker, 7), None);
        assert_eq!(checker.scan_and_verify(&worker, 5, 9).len(), 4);
        assert_eq!(checker.tracked_count(), 39);
        assert_eq!(checker.applied(), 1);
        checker.verify_all(&worker);
    }

    #[test]
    fn test_inverted_scan_is_empty() {
        let engine = small_engine();
        let worker = engine.worker().unwrap();
        let mut checker = ModelChecker::new();
        checker.put(&worker, 3, 3);
        assert!(checker.scan_and_verify(&worker, 9, 1).is_empty());
    }
}
