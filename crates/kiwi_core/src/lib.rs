//! # KiWi Core
//!
//! A chunked, lock-free, multiversion ordered map.
//!
//! This crate provides:
//! - Fixed-capacity segments with in-place, lock-free slot allocation
//! - An epoch-protected segment chain that splits and merges online
//! - Linearizable get, put and remove, and atomic range scans
//! - Approximate lower/upper size bounds
//! - Structural diagnostics and explicit compaction
//!
//! ## Design Principles
//!
//! - No global lock on any read or write path
//! - Every write gets a version from one engine-wide clock
//! - Scans read a consistent snapshot at their own version
//! - All per-thread state lives in an explicit [`Worker`]
//!
//! ## Example
//!
//! ```rust
//! use kiwi_core::{Engine, EngineConfig, ScanBuffer};
//!
//! let engine: Engine<u64, String> = Engine::new(EngineConfig::default()).unwrap();
//! let worker = engine.worker().unwrap();
//!
//! worker.put(5, "a".to_string());
//! worker.put(5, "b".to_string());
//! assert_eq!(worker.get(&5).as_deref(), Some("b"));
//!
//! worker.remove(5);
//! assert_eq!(worker.get(&5), None);
//!
//! let mut out = ScanBuffer::values_only();
//! worker.put(1, "x".to_string());
//! worker.put(2, "y".to_string());
//! assert_eq!(worker.scan_into(&0, &10, &mut out), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bounds;
mod config;
mod diagnostics;
mod engine;
mod error;
mod segment;
mod staging;
mod stats;
mod types;
mod worker;

pub use bounds::SizeBounds;
pub use config::EngineConfig;
pub use diagnostics::{SegmentReport, StructureReport};
pub use engine::Engine;
pub use error::{CoreError, CoreResult};
pub use segment::{ScanBuffer, SegmentState};
pub use stats::{EngineStats, StatsSnapshot};
pub use types::{Key, SegmentId, Value, Version};
pub use worker::Worker;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
