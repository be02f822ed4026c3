//! History command implementation.

use super::{CliError, EngineArgs, WorkloadArgs};
use kiwi_testkit::{HistoryLogger, Operation, RecordingWorker};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::thread;
use tracing::{info, warn};

/// Runs the history command.
pub fn run(
    engine_args: &EngineArgs,
    workload: &WorkloadArgs,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine_args.build()?;
    let logger = HistoryLogger::new();
    let threads = workload.threads.max(1);
    let per_thread = workload.operations / threads;
    let key_space = workload.key_space.max(1);

    thread::scope(|s| {
        for t in 0..threads as u64 {
            let engine = &engine;
            let logger = &logger;
            s.spawn(move || {
                let Ok(worker) = engine.worker() else {
                    warn!(thread = t, "no worker slot available");
                    return;
                };
                let recorder = RecordingWorker::new(&worker, logger);
                let mut rng = StdRng::seed_from_u64(workload.seed.wrapping_add(t));
                for i in 0..per_thread as u64 {
                    let key = rng.gen_range(0..key_space);
                    match rng.gen_range(0..10) {
                        // Values are unique per key: thread in the high bits.
                        0..=3 => recorder.put(key, (t << 32) | i),
                        4 => recorder.remove(key),
                        5..=8 => {
                            recorder.get(key);
                        }
                        _ => {
                            recorder.scan(key, key.saturating_add(workload.scan_span));
                        }
                    }
                }
            });
        }
    });

    let history = logger.history();
    let reads = history
        .operations
        .iter()
        .filter(|op| matches!(op.operation, Operation::Get { .. }))
        .count();
    info!(operations = history.len(), reads, "history recorded");

    if let Some(path) = output {
        history.write_json(BufWriter::new(File::create(path)?))?;
        println!("History written to {}", path.display());
    }

    match history.check() {
        Ok(()) => {
            println!("Checked {} operations: no anomalies", history.len());
            Ok(())
        }
        Err(violation) => Err(CliError::from(violation).into()),
    }
}
