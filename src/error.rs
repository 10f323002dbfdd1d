//! Construction-time failures. Every other cache operation degrades
//! silently instead of returning a `Result`.

use thiserror::Error;

/// Returned by [`crate::CacheBuilder::try_build`] when a required option is
/// missing or out of range.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("num_counters must be greater than zero")]
    ZeroCounters,
    #[error("max_cost must be greater than zero")]
    ZeroMaxCost,
    #[error("buffer_items must be greater than zero")]
    ZeroBufferItems,
}
