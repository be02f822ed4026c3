//! CLI command implementations.

pub mod history;
pub mod inspect;
pub mod stress;

use clap::{Args, ValueEnum};
use kiwi_core::{CoreResult, Engine, EngineConfig, SegmentReport, StatsSnapshot};
use kiwi_testkit::{HistoryViolation, StressConfig, TestKey, TestValue};
use serde::Serialize;
use thiserror::Error;

/// Errors reported by the commands themselves.
#[derive(Debug, Error)]
pub enum CliError {
    /// A stress run observed invalid reads or scans.
    #[error("{failed} of {total} operations observed invalid results")]
    StressFailures {
        /// Failed operations
        failed: usize,
        /// Total operations
        total: usize,
    },

    /// A recorded history failed its checks.
    #[error("history check failed: {0}")]
    History(#[from] HistoryViolation),
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON
    Json,
}

/// Order in which generated keys are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyOrder {
    /// Ascending
    Sequential,
    /// Descending
    Reverse,
    /// Shuffled
    Random,
}

/// Stress workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Workload {
    /// One worker writing
    SequentialWrites,
    /// One worker reading a populated engine
    SequentialReads,
    /// One worker mixing writes, reads, removes and scans
    Mixed,
    /// Many workers writing
    ConcurrentWrites,
    /// Many workers reading a populated engine
    ConcurrentReads,
    /// Many workers mixing writes, reads, removes and scans
    ConcurrentMixed,
    /// Concurrent mixed workload with a thread compacting throughout
    Compaction,
}

/// Engine tuning shared by all commands.
#[derive(Debug, Clone, Args)]
pub struct EngineArgs {
    /// Entries per segment
    #[arg(long, default_value = "4500")]
    pub segment_capacity: usize,

    /// Maximum segments engaged by one rebalance
    #[arg(long, default_value = "2")]
    pub rebalance_size: usize,

    /// Segments pre-built into the reuse pool
    #[arg(long, default_value = "0")]
    pub pool_size: usize,

    /// Worker slots
    #[arg(long, default_value = "64")]
    pub max_workers: usize,

    /// Disable size bound tracking
    #[arg(long)]
    pub no_size_bounds: bool,
}

impl EngineArgs {
    /// Builds the engine configuration.
    pub fn config(&self) -> EngineConfig {
        EngineConfig::new()
            .segment_capacity(self.segment_capacity)
            .rebalance_size(self.rebalance_size)
            .pool_size(self.pool_size)
            .max_workers(self.max_workers)
            .track_size_bounds(!self.no_size_bounds)
    }

    /// Creates an empty engine.
    pub fn build(&self) -> CoreResult<Engine<TestKey, TestValue>> {
        Engine::new(self.config())
    }
}

/// Workload shape shared by `stress` and `history`.
#[derive(Debug, Clone, Args)]
pub struct WorkloadArgs {
    /// Number of operations
    #[arg(short = 'n', long, default_value = "100000")]
    pub operations: usize,

    /// Number of threads
    #[arg(short, long, default_value = "4")]
    pub threads: usize,

    /// Number of distinct keys
    #[arg(long, default_value = "10000")]
    pub key_space: u64,

    /// Width of each scan
    #[arg(long, default_value = "100")]
    pub scan_span: u64,

    /// Random seed
    #[arg(long, default_value = "42")]
    pub seed: u64,
}

impl WorkloadArgs {
    /// Converts to a stress configuration.
    pub fn stress_config(&self) -> StressConfig {
        StressConfig {
            operations: self.operations,
            threads: self.threads,
            key_space: self.key_space,
            scan_span: self.scan_span,
            seed: self.seed,
        }
    }
}

/// Statistics snapshot in serializable form.
#[derive(Debug, Serialize)]
pub struct StatsSummary {
    /// Point lookups.
    pub gets: u64,
    /// Value writes.
    pub puts: u64,
    /// Removals.
    pub removes: u64,
    /// Range scans.
    pub scans: u64,
    /// Pairs returned by scans.
    pub scanned: u64,
    /// Writes restarted on a frozen segment.
    pub write_retries: u64,
    /// Staged writes refused by a freeze.
    pub staged_rejections: u64,
    /// Completed rebalances.
    pub rebalances: u64,
    /// Rebalances that split.
    pub splits: u64,
    /// Rebalances that merged.
    pub merges: u64,
    /// Segments created.
    pub segments_created: u64,
    /// Pool hits.
    pub pool_hits: u64,
    /// Pool misses.
    pub pool_misses: u64,
    /// Segments recycled into the pool.
    pub pool_recycled: u64,
}

impl From<StatsSnapshot> for StatsSummary {
    fn from(stats: StatsSnapshot) -> Self {
        Self {
            gets: stats.gets,
            puts: stats.puts,
            removes: stats.removes,
            scans: stats.scans,
            scanned: stats.scanned,
            write_retries: stats.write_retries,
            staged_rejections: stats.staged_rejections,
            rebalances: stats.rebalances,
            splits: stats.splits,
            merges: stats.merges,
            segments_created: stats.segments_created,
            pool_hits: stats.pool_hits,
            pool_misses: stats.pool_misses,
            pool_recycled: stats.pool_recycled,
        }
    }
}

/// One segment in serializable form.
#[derive(Debug, Serialize)]
pub struct SegmentSummary {
    /// Segment id.
    pub id: u64,
    /// Segment whose rebalance produced this one.
    pub creator: Option<u64>,
    /// Lower key bound; absent for the first segment.
    pub min_key: Option<String>,
    /// Lifecycle state.
    pub state: String,
    /// Entry capacity.
    pub capacity: usize,
    /// Allocated entries.
    pub allocated: usize,
    /// Linked entries.
    pub linked: usize,
    /// Distinct keys.
    pub distinct_keys: usize,
    /// Sorted prefix length.
    pub sorted_prefix: usize,
}

impl From<&SegmentReport> for SegmentSummary {
    fn from(segment: &SegmentReport) -> Self {
        Self {
            id: segment.id.as_u64(),
            creator: segment.creator.map(|id| id.as_u64()),
            min_key: segment.min_key.clone(),
            state: segment.state.to_string(),
            capacity: segment.capacity,
            allocated: segment.allocated,
            linked: segment.linked,
            distinct_keys: segment.distinct_keys,
            sorted_prefix: segment.sorted_prefix,
        }
    }
}

/// Everything the commands report about an engine.
#[derive(Debug, Serialize)]
pub struct EngineReport {
    /// Live keys at the newest version.
    pub live_keys: usize,
    /// Linked entries superseded by a newer entry of the same key.
    pub duplicate_entries: usize,
    /// Lower size bound; absent when bounds are disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_lower_bound: Option<usize>,
    /// Upper size bound; absent when bounds are disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_upper_bound: Option<usize>,
    /// Mean segment fill ratio.
    pub average_fill: f64,
    /// Per-segment layout.
    pub segments: Vec<SegmentSummary>,
    /// Operation and maintenance counters.
    pub stats: StatsSummary,
    #[serde(skip)]
    layout: String,
}

impl EngineReport {
    /// Collects the report. Meant to be called once the engine is quiescent.
    pub fn collect(engine: &Engine<TestKey, TestValue>) -> Self {
        let structure = engine.structure();
        let tracked = engine.bounds().is_enabled();
        Self {
            live_keys: engine.count_keys(),
            duplicate_entries: engine.count_duplicate_keys(),
            size_lower_bound: tracked.then(|| engine.size_lower_bound()),
            size_upper_bound: tracked.then(|| engine.size_upper_bound()),
            average_fill: structure.average_fill(),
            segments: structure.segments.iter().map(SegmentSummary::from).collect(),
            stats: engine.stats().snapshot().into(),
            layout: structure.to_string(),
        }
    }

    /// Prints the report as text.
    pub fn print_text(&self, show_segments: bool) {
        if show_segments {
            println!("{}", self.layout);
            println!();
        }
        println!("Live keys:         {}", self.live_keys);
        println!("Duplicate entries: {}", self.duplicate_entries);
        match (self.size_lower_bound, self.size_upper_bound) {
            (Some(lower), Some(upper)) => println!("Size bounds:       [{lower}, {upper}]"),
            _ => println!("Size bounds:       disabled"),
        }
        println!("Segments:          {}", self.segments.len());
        println!("Average fill:      {:.2}", self.average_fill);

        let stats = &self.stats;
        println!();
        println!("Operations:");
        println!("  gets {}, puts {}, removes {}", stats.gets, stats.puts, stats.removes);
        println!("  scans {} returning {} pairs", stats.scans, stats.scanned);
        println!(
            "  write retries {}, staged rejections {}",
            stats.write_retries, stats.staged_rejections
        );
        println!("Maintenance:");
        println!(
            "  rebalances {} (splits {}, merges {}), segments created {}",
            stats.rebalances, stats.splits, stats.merges, stats.segments_created
        );
        println!(
            "  pool hits {}, misses {}, recycled {}",
            stats.pool_hits, stats.pool_misses, stats.pool_recycled
        );
    }
}


