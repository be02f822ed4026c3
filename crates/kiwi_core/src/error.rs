//! Error types for the KiWi engine.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by the engine.
///
/// A saturated segment is not an error: it is handled internally by a
/// rebalance and the write is retried. An absent key is reported as `None`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The requested segment layout is not implemented.
    #[error("unsupported: {feature}")]
    Unsupported {
        /// The feature that was requested.
        feature: String,
    },

    /// The engine configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// All worker slots are claimed.
    #[error("worker limit reached: at most {max} workers may be active")]
    WorkerLimit {
        /// Configured number of worker slots.
        max: usize,
    },
}

impl CoreError {
    /// Creates an unsupported-feature error.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a worker limit error.
    pub fn worker_limit(max: usize) -> Self {
        Self::WorkerLimit { max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = CoreError::unsupported("variable-length keys");
        assert_eq!(err.to_string(), "unsupported: variable-length keys");

        let err = CoreError::worker_limit(4);
        assert_eq!(
            err.to_string(),
            "worker limit reached: at most 4 workers may be active"
        );
    }
}
