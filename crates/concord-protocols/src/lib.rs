//! Concord Protocols - Serial Commands, Broadcast Payload and Telemetry
//!
//! Everything that crosses a node boundary as bytes:
//!
//! - [`command`]: the line-oriented serial command protocol (`t`, `n`, `a`, `p`)
//!   that configures and triggers a [`ConsensusEngine`](concord_consensus::ConsensusEngine)
//! - [`wire`]: the fixed 8-byte advertisement each node broadcasts
//! - [`telemetry`]: the `d...` line reported back over serial
//!
//! # Example
//!
//! ```rust,ignore
//! use concord_protocols::{dispatch, Advertisement, LineFramer};
//!
//! let mut framer = LineFramer::new();
//! for line in framer.push(b"n1,3,1,2\ra100,1,100,50,1,0\rt1\r") {
//!     dispatch(&line, &mut engine, Instant::now())?;
//! }
//! let payload = Advertisement::new(3, engine.broadcast_value(), true).encode();
//! ```

pub mod command;
pub mod error;
pub mod telemetry;
pub mod wire;

pub use command::{dispatch, parse_line, Command, LineFramer, Trigger, MAX_LINE_LEN};
pub use error::{Error, Result};
pub use telemetry::{encode_telemetry, TelemetryLine, LINE_END};
pub use wire::{Advertisement, MANUFACTURER_ID, NETID_DISABLED, NETID_ENABLED, PAYLOAD_LEN};
