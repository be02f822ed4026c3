//! Property tests: single-threaded operation sequences checked against a
//! `BTreeMap` model.

use kiwi_core::{Engine, EngineConfig, ScanBuffer};
use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Op {
    Put(u16, u32),
    Remove(u16),
    Get(u16),
    Scan(u16, u16),
    Compact,
}

fn op() -> impl Strategy<Value = Op> {
    let key = 0u16..96;
    prop_oneof![
        6 => (key.clone(), any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
        2 => key.clone().prop_map(Op::Remove),
        2 => key.clone().prop_map(Op::Get),
        2 => (key.clone(), key).prop_map(|(a, b)| Op::Scan(a.min(b), a.max(b))),
        1 => Just(Op::Compact),
    ]
}

fn engine(capacity: usize) -> Engine<u16, u32> {
    let config = EngineConfig::new()
        .segment_capacity(capacity)
        .rebalance_size(3)
        .pool_size(4)
        .track_size_bounds(true);
    Engine::new(config).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn engine_matches_ordered_map(
        ops in prop::collection::vec(op(), 1..400),
        capacity in 4usize..24,
    ) {
        let engine = engine(capacity);
        let worker = engine.worker().unwrap();
        let mut model = BTreeMap::new();
        let mut last_version = None;

        for op in ops {
            match op {
                Op::Put(key, value) => {
                    let version = worker.put(key, value);
                    prop_assert!(Some(version) > last_version);
                    last_version = Some(version);
                    model.insert(key, value);
                }
                Op::Remove(key) => {
                    let version = worker.remove(key);
                    prop_assert!(Some(version) > last_version);
                    last_version = Some(version);
                    model.remove(&key);
                }
                Op::Get(key) => {
                    prop_assert_eq!(worker.get(&key), model.get(&key).copied());
                }
                Op::Scan(min, max) => {
                    let expected: Vec<_> = model
                        .range(min..=max)
                        .map(|(k, v)| (*k, *v))
                        .collect();
                    prop_assert_eq!(worker.scan(&min, &max), expected);
                }
                Op::Compact => {
                    engine.compact_all();
                    prop_assert_eq!(engine.count_duplicate_keys(), 0);
                }
            }
        }

        let everything: Vec<_> = model.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(worker.range(..), everything);
        prop_assert_eq!(engine.count_keys(), model.len());
        prop_assert!(engine.size_lower_bound() <= model.len());
        prop_assert!(model.len() <= engine.size_upper_bound());
    }

    #[test]
    fn compaction_preserves_scan_output(
        ops in prop::collection::vec(op(), 1..300),
        min in 0u16..96,
        span in 0u16..96,
    ) {
        let engine = engine(8);
        let worker = engine.worker().unwrap();
        for op in ops {
            match op {
                Op::Put(key, value) => {
                    worker.put(key, value);
                }
                Op::Remove(key) => {
                    worker.remove(key);
                }
                _ => {}
            }
        }

        let max = min.saturating_add(span);
        let mut before = ScanBuffer::with_keys();
        let count = worker.scan_into(&min, &max, &mut before);
        prop_assert_eq!(count, before.len());

        engine.compact_all();

        let mut after = ScanBuffer::with_keys();
        worker.scan_into(&min, &max, &mut after);
        prop_assert_eq!(before.keys(), after.keys());
        prop_assert_eq!(before.values(), after.values());
        prop_assert_eq!(engine.size_lower_bound(), engine.count_keys());
        prop_assert_eq!(engine.size_upper_bound(), engine.count_keys());
    }

    #[test]
    fn scan_output_is_strictly_ascending(
        keys in prop::collection::vec(any::<u64>(), 0..300),
        min in any::<u64>(),
        max in any::<u64>(),
    ) {
        let engine: Engine<u64, u64> =
            Engine::new(EngineConfig::new().segment_capacity(16)).unwrap();
        let worker = engine.worker().unwrap();
        for key in &keys {
            worker.put(*key, key.wrapping_mul(3));
        }

        let pairs = worker.scan(&min, &max);
        if min > max {
            prop_assert!(pairs.is_empty());
        }
        prop_assert!(pairs.windows(2).all(|w| w[0].0 < w[1].0));
        prop_assert!(pairs.iter().all(|(k, v)| *k >= min && *k <= max && *v == k.wrapping_mul(3)));
    }
}

#[test]
fn values_only_scan_counts_match_model() {
    let engine = engine(8);
    let worker = engine.worker().unwrap();
    for key in (0..90u16).rev() {
        worker.put(key, u32::from(key));
    }
    for key in (0..90u16).step_by(3) {
        worker.remove(key);
    }

    let mut out = ScanBuffer::values_only();
    assert_eq!(worker.scan_into(&10, &40, &mut out), 21);
    assert!(out.keys().is_none());
    assert_eq!(out.values().first(), Some(&10));

    // Appends after what is already collected.
    assert_eq!(worker.scan_into(&0, &2, &mut out), 2);
    assert_eq!(out.len(), 23);
}
