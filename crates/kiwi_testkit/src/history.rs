//! Operation history recording and checking.
//!
//! A [`HistoryLogger`] collects timed operations from any number of
//! threads through [`RecordingWorker`]s. The resulting [`History`] can be
//! dumped as JSON or checked for per-key read anomalies.
//!
//! The checker assumes every value written to a key is unique to that key,
//! so a read identifies the put it observed. Reads that return nothing are
//! not checked.

use crate::fixtures::{TestKey, TestValue};
use kiwi_core::Worker;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::time::{Duration, Instant};
use thiserror::Error;

/// An operation together with what it returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// A point read
    Get {
        /// Key
        key: TestKey,
        /// Value returned
        result: Option<TestValue>,
    },
    /// A write
    Put {
        /// Key
        key: TestKey,
        /// Value written
        value: TestValue,
    },
    /// A removal
    Remove {
        /// Key
        key: TestKey,
    },
    /// An inclusive range scan
    Scan {
        /// Lower bound
        min: TestKey,
        /// Upper bound
        max: TestKey,
        /// Pairs returned
        result: Vec<(TestKey, TestValue)>,
    },
    /// A lower size bound query
    SizeLowerBound {
        /// Bound returned
        result: usize,
    },
    /// An upper size bound query
    SizeUpperBound {
        /// Bound returned
        result: usize,
    },
}

/// An operation with its invocation and response times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimedOperation {
    /// Worker slot that issued the operation.
    pub worker: usize,
    /// Invocation time, relative to the logger's creation.
    pub start: Duration,
    /// Response time, relative to the logger's creation.
    pub end: Duration,
    /// The operation.
    pub operation: Operation,
}

impl TimedOperation {
    /// Returns true if this operation responded before `other` was invoked.
    pub fn precedes(&self, other: &TimedOperation) -> bool {
        self.end < other.start
    }
}

/// Thread-safe collector of timed operations.
#[derive(Debug)]
pub struct HistoryLogger {
    origin: Instant,
    operations: Mutex<Vec<TimedOperation>>,
}

impl HistoryLogger {
    /// Creates an empty logger; all times are measured from now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            operations: Mutex::new(Vec::new()),
        }
    }

    /// Time elapsed since the logger was created.
    pub fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Records an operation invoked at `start` that has just responded.
    pub fn log(&self, worker: usize, start: Duration, operation: Operation) {
        let end = self.now();
        self.operations.lock().push(TimedOperation {
            worker,
            start,
            end,
            operation,
        });
    }

    /// Returns the number of recorded operations.
    pub fn len(&self) -> usize {
        self.operations.lock().len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.operations.lock().is_empty()
    }

    /// Returns the recorded history, ordered by invocation time.
    pub fn history(&self) -> History {
        let mut operations = self.operations.lock().clone();
        operations.sort_by_key(|op| (op.start, op.end));
        History { operations }
    }
}

impl Default for HistoryLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// A worker wrapper that logs every operation it performs.
pub struct RecordingWorker<'a, 'e> {
    worker: &'a Worker<'e, TestKey, TestValue>,
    logger: &'a HistoryLogger,
}

impl<'a, 'e> RecordingWorker<'a, 'e> {
    /// Wraps `worker`, logging into `logger`.
    pub fn new(worker: &'a Worker<'e, TestKey, TestValue>, logger: &'a HistoryLogger) -> Self {
        Self { worker, logger }
    }

    /// Writes a value.
    pub fn put(&self, key: TestKey, value: TestValue) {
        let start = self.logger.now();
        self.worker.put(key, value);
        self.logger
            .log(self.worker.id(), start, Operation::Put { key, value });
    }

    /// Removes a key.
    pub fn remove(&self, key: TestKey) {
        let start = self.logger.now();
        self.worker.remove(key);
        self.logger
            .log(self.worker.id(), start, Operation::Remove { key });
    }

    /// Reads a key.
    pub fn get(&self, key: TestKey) -> Option<TestValue> {
        let start = self.logger.now();
        let result = self.worker.get(&key);
        self.logger
            .log(self.worker.id(), start, Operation::Get { key, result });
        result
    }

    /// Scans `[min, max]`.
    pub fn scan(&self, min: TestKey, max: TestKey) -> Vec<(TestKey, TestValue)> {
        let start = self.logger.now();
        let result = self.worker.scan(&min, &max);
        self.logger.log(
            self.worker.id(),
            start,
            Operation::Scan {
                min,
                max,
                result: result.clone(),
            },
        );
        result
    }

    /// Reads the lower size bound.
    pub fn size_lower_bound(&self) -> usize {
        let start = self.logger.now();
        let result = self.worker.engine().size_lower_bound();
        self.logger
            .log(self.worker.id(), start, Operation::SizeLowerBound { result });
        result
    }

    /// Reads the upper size bound.
    pub fn size_upper_bound(&self) -> usize {
        let start = self.logger.now();
        let result = self.worker.engine().size_upper_bound();
        self.logger
            .log(self.worker.id(), start, Operation::SizeUpperBound { result });
        result
    }
}

/// An anomaly found in a history.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryViolation {
    /// A read returned a value no put wrote.
    #[error("key {key}: read value {value} that was never written")]
    UnknownValue {
        /// Key
        key: TestKey,
        /// Value read
        value: TestValue,
    },
    /// A read returned a value whose put started after the read ended.
    #[error("key {key}: read value {value} before it was written")]
    FutureRead {
        /// Key
        key: TestKey,
        /// Value read
        value: TestValue,
    },
    /// A read returned a value overwritten by one an earlier read returned.
    #[error("key {key}: read {stale} after an earlier read saw {newer}, which overwrote it")]
    StaleRead {
        /// Key
        key: TestKey,
        /// Value returned by the later read
        stale: TestValue,
        /// Value returned by the earlier read
        newer: TestValue,
    },
    /// A scan returned keys out of order or out of its range.
    #[error("scan [{min}, {max}]: key {key} is out of order or out of range")]
    MalformedScan {
        /// Lower bound
        min: TestKey,
        /// Upper bound
        max: TestKey,
        /// Offending key
        key: TestKey,
    },
}

/// Interval of an operation in logger time.
#[derive(Debug, Clone, Copy)]
struct Interval {
    start: Duration,
    end: Duration,
}

/// A read that observed a put.
#[derive(Debug, Clone, Copy)]
struct Observation {
    read: Interval,
    put: Interval,
    value: TestValue,
}

/// A recorded history of timed operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct History {
    /// Operations ordered by invocation time.
    pub operations: Vec<TimedOperation>,
}

impl History {
    /// Returns the number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the history is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Serializes the history as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Writes the history as JSON to `writer`.
    pub fn write_json<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(writer, self)
    }

    /// Runs every check.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn check(&self) -> Result<(), HistoryViolation> {
        self.check_scans()?;
        self.check_monotonic_reads()
    }

    /// Checks that every scan is strictly ascending and within its range.
    ///
    /// # Errors
    ///
    /// Returns the first malformed scan.
    pub fn check_scans(&self) -> Result<(), HistoryViolation> {
        for op in &self.operations {
            let Operation::Scan { min, max, result } = &op.operation else {
                continue;
            };
            let mut previous: Option<TestKey> = None;
            for &(key, _) in result {
                let ordered = previous.map_or(true, |prev| prev < key);
                if !ordered || key < *min || key > *max {
                    return Err(HistoryViolation::MalformedScan {
                        min: *min,
                        max: *max,
                        key,
                    });
                }
                previous = Some(key);
            }
        }
        Ok(())
    }

    /// Checks, per key, that reads never observe a value from the future
    /// and never go back to a value that a previously completed read had
    /// already seen overwritten.
    ///
    /// Scan results count as reads of every key they return.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn check_monotonic_reads(&self) -> Result<(), HistoryViolation> {
        let mut puts: HashMap<(TestKey, TestValue), Interval> = HashMap::new();
        for op in &self.operations {
            if let Operation::Put { key, value } = op.operation {
                puts.entry((key, value)).or_insert(Interval {
                    start: op.start,
                    end: op.end,
                });
            }
        }

        let mut observations: HashMap<TestKey, Vec<Observation>> = HashMap::new();
        for op in &self.operations {
            let read = Interval {
                start: op.start,
                end: op.end,
            };
            let pairs: Vec<(TestKey, TestValue)> = match &op.operation {
                Operation::Get {
                    key,
                    result: Some(value),
                } => vec![(*key, *value)],
                Operation::Scan { result, .. } => result.clone(),
                _ => continue,
            };
            for (key, value) in pairs {
                let Some(&put) = puts.get(&(key, value)) else {
                    return Err(HistoryViolation::UnknownValue { key, value });
                };
                if put.start > read.end {
                    return Err(HistoryViolation::FutureRead { key, value });
                }
                observations
                    .entry(key)
                    .or_default()
                    .push(Observation { read, put, value });
            }
        }

        for (key, reads) in observations {
            check_key(key, reads)?;
        }
        Ok(())
    }
}

/// A later read is stale when its put finished before the put observed by
/// some read that completed before the later read began.
fn check_key(key: TestKey, reads: Vec<Observation>) -> Result<(), HistoryViolation> {
    let mut by_end = reads.clone();
    by_end.sort_by_key(|obs| obs.read.end);
    let mut by_start = reads;
    by_start.sort_by_key(|obs| obs.read.start);

    let mut completed = by_end.iter().peekable();
    let mut newest: Option<&Observation> = None;
    for later in &by_start {
        while let Some(earlier) = completed.next_if(|obs| obs.read.end < later.read.start) {
            if newest.map_or(true, |best| earlier.put.start > best.put.start) {
                newest = Some(earlier);
            }
        }
        if let Some(newer) = newest {
            if later.put.end < newer.put.start {
                return Err(HistoryViolation::StaleRead {
                    key,
                    stale: later.value,
                    newer: newer.value,
                });
            }
        }
    }
    Ok(())
}


