//! Inspect command implementation.

use super::{EngineArgs, EngineReport, KeyOrder, OutputFormat};
use kiwi_testkit::{TestKey, TestValue};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use tracing::info;

/// What to write before inspecting.
#[derive(Debug, Clone)]
pub struct InspectOptions {
    /// Number of distinct keys.
    pub keys: u64,
    /// Write order.
    pub order: KeyOrder,
    /// Times every key is written.
    pub versions: u64,
    /// Remove every n-th key afterwards.
    pub remove_every: Option<u64>,
    /// Compact before reporting.
    pub compact: bool,
    /// Log the layout through tracing.
    pub log_structure: bool,
}

/// Runs the inspect command.
pub fn run(
    engine_args: &EngineArgs,
    options: &InspectOptions,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine_args.build()?;
    {
        let worker = engine.worker()?;
        for version in 0..options.versions {
            for key in key_order(options.keys, options.order, version) {
                worker.put(key, value_for(key, version));
            }
        }
        if let Some(step) = options.remove_every.filter(|&step| step > 0) {
            for key in (0..options.keys).step_by(step as usize) {
                worker.remove(key);
            }
        }
    }
    info!(
        keys = options.keys,
        versions = options.versions,
        segments = engine.segment_count(),
        "engine populated"
    );

    if options.compact {
        engine.compact_all();
    }
    if options.log_structure {
        engine.print_structure();
    }

    let report = EngineReport::collect(&engine);
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => report.print_text(true),
    }

    Ok(())
}

fn value_for(key: TestKey, version: u64) -> TestValue {
    key.wrapping_mul(31).wrapping_add(version)
}

fn key_order(count: u64, order: KeyOrder, round: u64) -> Vec<TestKey> {
    match order {
        KeyOrder::Sequential => (0..count).collect(),
        KeyOrder::Reverse => (0..count).rev().collect(),
        KeyOrder::Random => {
            let mut keys: Vec<_> = (0..count).collect();
            keys.shuffle(&mut StdRng::seed_from_u64(round));
            keys
        }
    }
}
