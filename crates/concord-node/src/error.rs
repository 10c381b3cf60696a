//! Error types for concord-node.

use thiserror::Error;

/// Result type for concord-node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while bringing up or running a node.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Command or payload error
    #[error("Protocol error: {0}")]
    Protocol(#[from] concord_protocols::Error),

    /// Consensus configuration rejected
    #[error("Consensus error: {0}")]
    Consensus(#[from] concord_consensus::Error),

    /// Radio could not be brought up
    #[error("Radio error: {0}")]
    Radio(String),
}
