//! Error types shared across the workspace.

use thiserror::Error;

/// Failures of clock bootstrap and store construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The clock could not read its timebase or the wall clock at startup.
    #[error("clock initialization failed: {0}")]
    ClockInit(String),

    /// The tick counter needed by the emulated clock is not usable here.
    #[error("tick counter unavailable: {0}")]
    TickCounterUnavailable(String),

    /// A store was requested with a shard count it cannot be built with.
    #[error("invalid shard count {count}: must be at least 1")]
    InvalidShardCount {
        /// Requested number of shards.
        count: usize,
    },
}

/// Convenience type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
