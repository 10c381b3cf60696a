//! Concord Node - Two-Rate Scheduler and Collaborators
//!
//! Hosts one [`ConsensusEngine`](concord_consensus::ConsensusEngine) and
//! drives it at two rates:
//!
//! - **Fast path** (`dt`, typically 1 ms): step the control law and replace
//!   the advertised payload
//! - **Slow path** (`Ts`, typically ≥ 100 ms): drain neighbor reports, run
//!   lifecycle transitions, emit telemetry
//!
//! Neighbor reports reach the slow path through a [`LatestCell`]: producers
//! never block and the consumer always sees the freshest data.

pub mod cell;
pub mod config;
pub mod error;
pub mod inbox;
pub mod node;
pub mod radio;
pub mod scheduler;
pub mod serial;

pub use cell::LatestCell;
pub use config::NodeConfig;
pub use error::{Error, Result};
pub use inbox::{NeighborInbox, NeighborReport, NeighborSnapshot};
pub use node::{run, ConcordNode};
pub use radio::{MemoryRadio, MemorySink, Radio, RadioConfig, StdoutSink, TelemetrySink, UdpRadio};
pub use scheduler::{advertisement, engine_now, Scheduler, SharedEngine};
pub use serial::run_serial;
