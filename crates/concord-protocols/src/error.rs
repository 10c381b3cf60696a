//! Error types for concord-protocols.

use thiserror::Error;

/// Result type for concord-protocols operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from parsing commands or decoding broadcast payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Line with no type byte.
    #[error("empty command line")]
    EmptyLine,

    /// Type byte with no handler.
    #[error("unknown command type {0:?}")]
    UnknownType(char),

    /// Required field absent.
    #[error("command '{command}' is missing field '{field}'")]
    MissingField { command: char, field: &'static str },

    /// More fields than the command accepts.
    #[error("command '{command}' takes at most {max} fields, got {got}")]
    TooManyFields { command: char, max: usize, got: usize },

    /// Field present but not a valid integer for its slot.
    #[error("command '{command}' field '{field}': invalid value {value:?}")]
    InvalidField {
        command: char,
        field: &'static str,
        value: String,
    },

    /// Fields parsed but the configuration was refused.
    #[error("rejected: {0}")]
    Rejected(#[from] concord_consensus::Error),

    /// Payload of the wrong size.
    #[error("payload length {got}, expected {expected}")]
    WrongLength { expected: usize, got: usize },

    /// Payload from another vendor.
    #[error("foreign manufacturer id {0:#06x}")]
    ForeignManufacturer(u16),

    /// Payload with an unrecognised network tag.
    #[error("unknown network id {0:#04x}")]
    UnknownNetId(u8),
}
