//! Engine configuration.

use crate::error::{CoreError, CoreResult};

/// Smallest segment capacity the rebalance policy can work with.
const MIN_SEGMENT_CAPACITY: usize = 4;

/// Configuration for an [`Engine`](crate::Engine).
///
/// All tuning is explicit and per engine; nothing is read from global state.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of entries a pooled segment can hold.
    pub segment_capacity: usize,

    /// Maximum number of adjacent segments engaged by a single rebalance.
    pub rebalance_size: usize,

    /// Number of segments pre-built into the reuse pool (0 = no pool).
    pub pool_size: usize,

    /// Number of worker slots (concurrent workers allowed).
    pub max_workers: usize,

    /// Whether approximate lower/upper size bounds are maintained.
    pub track_size_bounds: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            segment_capacity: 4500,
            rebalance_size: 2,
            pool_size: 0,
            max_workers: 64,
            track_size_bounds: false,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-segment entry capacity.
    #[must_use]
    pub const fn segment_capacity(mut self, capacity: usize) -> Self {
        self.segment_capacity = capacity;
        self
    }

    /// Sets how many adjacent segments a rebalance may engage.
    #[must_use]
    pub const fn rebalance_size(mut self, size: usize) -> Self {
        self.rebalance_size = size;
        self
    }

    /// Sets the number of pre-built pooled segments.
    #[must_use]
    pub const fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Sets the number of worker slots.
    #[must_use]
    pub const fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    /// Enables or disables size bound tracking.
    #[must_use]
    pub const fn track_size_bounds(mut self, value: bool) -> Self {
        self.track_size_bounds = value;
        self
    }

    /// Target record count of a segment produced by a split.
    pub(crate) const fn split_target(&self) -> usize {
        self.segment_capacity / 2
    }

    /// Retained record count at or below which a rebalance merges with
    /// its successor.
    pub(crate) const fn merge_threshold(&self) -> usize {
        self.segment_capacity / 4
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> CoreResult<()> {
        if self.segment_capacity < MIN_SEGMENT_CAPACITY {
            return Err(CoreError::invalid_config(format!(
                "segment_capacity must be at least {MIN_SEGMENT_CAPACITY}, got {}",
                self.segment_capacity
            )));
        }
        if self.segment_capacity >= u32::MAX as usize {
            return Err(CoreError::invalid_config(
                "segment_capacity must fit in a 32-bit slot index",
            ));
        }
        if self.rebalance_size == 0 {
            return Err(CoreError::invalid_config("rebalance_size must be at least 1"));
        }
        if self.max_workers == 0 {
            return Err(CoreError::invalid_config("max_workers must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.segment_capacity, 4500);
        assert_eq!(config.rebalance_size, 2);
        assert!(!config.track_size_bounds);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = EngineConfig::new()
            .segment_capacity(64)
            .pool_size(8)
            .max_workers(4)
            .track_size_bounds(true);

        assert_eq!(config.segment_capacity, 64);
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.max_workers, 4);
        assert!(config.track_size_bounds);
        assert_eq!(config.split_target(), 32);
        assert_eq!(config.merge_threshold(), 16);
    }

    #[test]
    fn rejects_tiny_segments() {
        let err = EngineConfig::new().segment_capacity(2).validate().unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(EngineConfig::new().max_workers(0).validate().is_err());
        assert!(EngineConfig::new().rebalance_size(0).validate().is_err());
    }
}
