//! KiWi CLI
//!
//! Command-line tools for exercising an in-memory KiWi engine.
//!
//! # Commands
//!
//! - `stress` - Run a workload and report throughput, layout and statistics
//! - `inspect` - Build an engine from a key pattern and show its segments
//! - `history` - Record a concurrent history and check it for read anomalies

mod commands;

use clap::{Parser, Subcommand};
use commands::{EngineArgs, KeyOrder, OutputFormat, Workload, WorkloadArgs};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// KiWi command-line engine tools.
#[derive(Parser)]
#[command(name = "kiwi")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a stress workload against a fresh engine
    Stress {
        #[command(flatten)]
        engine: EngineArgs,

        #[command(flatten)]
        workload: WorkloadArgs,

        /// Workload to run
        #[arg(short = 'w', long, value_enum, default_value = "concurrent-mixed")]
        kind: Workload,

        /// Compact the engine after the workload
        #[arg(long)]
        compact: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Populate an engine and display its segment layout
    Inspect {
        #[command(flatten)]
        engine: EngineArgs,

        /// Number of distinct keys to write
        #[arg(short, long, default_value = "10000")]
        keys: u64,

        /// Order in which keys are written
        #[arg(short, long, value_enum, default_value = "random")]
        order: KeyOrder,

        /// Times every key is written
        #[arg(long, default_value = "1")]
        versions: u64,

        /// Remove every n-th key after writing
        #[arg(long)]
        remove_every: Option<u64>,

        /// Compact the engine before reporting
        #[arg(long)]
        compact: bool,

        /// Also log the layout through tracing, one event per segment
        #[arg(long)]
        log_structure: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Record a concurrent operation history and check it
    History {
        #[command(flatten)]
        engine: EngineArgs,

        #[command(flatten)]
        workload: WorkloadArgs,

        /// Write the recorded history as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Stress {
            engine,
            workload,
            kind,
            compact,
            format,
        } => {
            commands::stress::run(&engine, &workload, kind, compact, format)?;
        }
        Commands::Inspect {
            engine,
            keys,
            order,
            versions,
            remove_every,
            compact,
            log_structure,
            format,
        } => {
            let options = commands::inspect::InspectOptions {
                keys,
                order,
                versions: versions.max(1),
                remove_every,
                compact,
                log_structure,
            };
            commands::inspect::run(&engine, &options, format)?;
        }
        Commands::History {
            engine,
            workload,
            output,
        } => {
            commands::history::run(&engine, &workload, output.as_deref())?;
        }
        Commands::Version => {
            println!("KiWi CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("KiWi Core v{}", kiwi_core::VERSION);
        }
    }

    Ok(())
}
