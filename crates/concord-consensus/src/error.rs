//! Error types for concord-consensus.

use thiserror::Error;

/// Result type for concord-consensus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration rejected by the consensus core.
///
/// None of these is fatal: the engine keeps its previous valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Neighbor list violates capacity, uniqueness or self-exclusion.
    #[error("invalid network configuration: {0}")]
    InvalidNetwork(String),

    /// Disturbance configuration with `samples = 0`.
    #[error("disturbance samples must be greater than zero")]
    ZeroSamples,

    /// Algorithm selector outside the known family.
    #[error("unknown algorithm selector: {0}")]
    UnknownAlgorithm(u8),

    /// Disturbance mode selector outside the known set.
    #[error("unknown disturbance mode: {0}")]
    UnknownDisturbanceMode(u8),

    /// Scale factors or hysteresis thresholds are inconsistent.
    #[error("invalid scale configuration: {0}")]
    InvalidScale(String),

    /// Periods that would stall a scheduler.
    #[error("invalid timing: {0}")]
    InvalidTiming(String),
}
