//! Concord Consensus Core
//!
//! A leaderless scalar consensus node: every node drives a scaled integer
//! `state` toward agreement with a small, fixed set of neighbors that it only
//! hears through short-range broadcast.
//!
//! # Control Law
//!
//! Each node carries two variables:
//! - `state` (x): the physical quantity being controlled
//! - `vstate` (z): a virtual reference that diffuses toward the neighbors' `vstate`
//!
//! The finite-time adaptive law couples them through an adaptive gain ϑ whose
//! growth is switched by a hysteresis latch on σ = x − z:
//!
//! ```text
//! v_i = Σ_j −sign(z − z_j)·sqrt(|z − z_j|)      (enabled neighbors only)
//! u_i = v_i − ϑ·sign(σ)
//! x'  = max(0, x + dt·(u_i + ν))
//! z'  = max(0, z + dt·v_i)
//! ϑ'  = max(0, ϑ + dt·dϑ),   dϑ ∈ {0, η}
//! ```
//!
//! The older law family (original, integral, PI with low-pass filter) is kept
//! as an [`AlgorithmKind`] switch over the same pipeline.
//!
//! # Fixed Point
//!
//! Every value that crosses the radio or the serial link is an `i32` scaled by
//! [`ScaleConfig::scale_factor`]. All nodes of one network must agree on the
//! scale; nothing here can check that.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start──▶ Armed ──setup──▶ Running ──stop──▶ Stopped ──start──▶ Armed
//! ```
//!
//! The [`ConsensusEngine`] owns the whole record. Schedulers hold it behind a
//! lock and only talk to it through its methods.

mod disturbance;
mod engine;
mod error;
mod law;
mod neighbors;
mod scale;
mod state;

pub use disturbance::{DisturbanceConfig, DisturbanceGenerator, DisturbanceMode};
pub use engine::{
    AlgorithmConfig, ConsensusEngine, Lifecycle, NetworkConfig, RunConfig, TelemetrySnapshot,
    Transition, DEFAULT_PERIOD_MS, DEFAULT_STEP_MS,
};
pub use error::{Error, Result};
pub use law::{coupling, mean_error, sign, step, AlgorithmKind, LawParams, POLE_SCALE};
pub use neighbors::{NeighborSlot, NeighborTable, NodeIdentity};
pub use scale::ScaleConfig;
pub use state::{DynamicState, InitialConditions};

/// Scaled integer carried on the wire and over serial.
pub type Fixed = i32;

/// Floating domain used inside one control step.
pub type Float = f32;

/// Capacity of the neighbor table.
pub const N_MAX: usize = 4;

// neighbor_count travels as a u8
const _: () = assert!(N_MAX <= u8::MAX as usize);
