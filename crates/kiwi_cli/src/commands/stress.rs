//! Stress command implementation.

use super::{CliError, EngineArgs, EngineReport, OutputFormat, Workload, WorkloadArgs};
use kiwi_testkit::{
    stress_compaction, stress_concurrent_mixed, stress_concurrent_reads, stress_concurrent_writes,
    stress_mixed_operations, stress_sequential_reads, stress_sequential_writes, StressTestResult,
};
use serde::Serialize;
use tracing::info;

/// Throughput figures of one run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    /// Workload that ran.
    pub workload: Workload,
    /// Worker threads.
    pub threads: usize,
    /// Total operations performed.
    pub total_ops: usize,
    /// Operations that observed valid results.
    pub successful_ops: usize,
    /// Operations that observed invalid results.
    pub failed_ops: usize,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u128,
    /// Operations per second.
    pub ops_per_second: f64,
}

/// Stress run output.
#[derive(Debug, Serialize)]
pub struct StressOutput {
    /// Throughput figures.
    pub run: RunSummary,
    /// Engine state after the run.
    pub engine: EngineReport,
}

/// Runs the stress command.
pub fn run(
    engine_args: &EngineArgs,
    workload_args: &WorkloadArgs,
    workload: Workload,
    compact: bool,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine_args.build()?;
    let config = workload_args.stress_config();
    info!(
        ?workload,
        operations = config.operations,
        threads = config.threads,
        "starting stress run"
    );

    let result: StressTestResult = match workload {
        Workload::SequentialWrites => stress_sequential_writes(&engine, &config),
        Workload::SequentialReads => stress_sequential_reads(&engine, &config),
        Workload::Mixed => stress_mixed_operations(&engine, &config),
        Workload::ConcurrentWrites => stress_concurrent_writes(&engine, &config),
        Workload::ConcurrentReads => stress_concurrent_reads(&engine, &config),
        Workload::ConcurrentMixed => stress_concurrent_mixed(&engine, &config),
        Workload::Compaction => stress_compaction(&engine, &config),
    };

    if compact {
        engine.compact_all();
    }

    let output = StressOutput {
        run: RunSummary {
            workload,
            threads: config.threads,
            total_ops: result.total_ops,
            successful_ops: result.successful_ops,
            failed_ops: result.failed_ops,
            duration_ms: result.duration.as_millis(),
            ops_per_second: result.ops_per_second,
        },
        engine: EngineReport::collect(&engine),
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            result.print_summary(&format!("{workload:?}"));
            println!();
            output.engine.print_text(false);
        }
    }

    if result.failed_ops > 0 {
        return Err(CliError::StressFailures {
            failed: result.failed_ops,
            total: result.total_ops,
        }
        .into());
    }
    Ok(())
}
