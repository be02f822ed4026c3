//! # KiWi Testkit
//!
//! Test utilities for KiWi.
//!
//! This crate provides:
//! - Engine fixtures and pre-populated scenarios
//! - Property-based operation generators using proptest
//! - A model checker that mirrors operations into a `BTreeMap`
//! - Stress testing utilities
//! - An operation history recorder with a monotonic-read checker
//!
//! ## Usage
//!
//! ```rust
//! use kiwi_testkit::prelude::*;
//!
//! with_engine(|engine| {
//!     let worker = engine.worker().unwrap();
//!     worker.put(1, 10);
//!     assert_eq!(worker.get(&1), Some(10));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod history;
pub mod model;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::history::*;
    pub use crate::model::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use history::*;
pub use model::*;
pub use stress::*;
