//! Dynamic state advanced by the control law.

use crate::{Fixed, Float};

/// Values the dynamic state is reset to on trigger-start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InitialConditions {
    pub state0: Fixed,
    pub vstate0: Fixed,
    pub vartheta0: Fixed,
}

impl Default for InitialConditions {
    fn default() -> Self {
        Self {
            state0: 100,
            vstate0: 50,
            vartheta0: 1,
        }
    }
}

/// The variables one control step reads and writes.
///
/// Only the control law mutates this, always under the engine's lock.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DynamicState {
    /// Primary variable x.
    pub state: Fixed,
    /// Virtual reference z, broadcast to neighbors.
    pub vstate: Fixed,
    /// Adaptive gain ϑ.
    pub vartheta: Fixed,
    /// σ = x − z from the last step, scaled.
    pub sigma: Fixed,
    /// Hysteresis latch for the gain derivative.
    pub active: bool,
    /// Last coupling term (telemetry only).
    pub gi: Float,
    /// Last control input (telemetry only).
    pub ui: Float,
    /// Low-pass filtered error (PI-LPF memory).
    pub error_dc: Float,
    /// Integral accumulator (PI-LPF memory).
    pub integral: Float,
}

impl DynamicState {
    /// Fresh state at the configured initial values.
    pub fn from_initial(initial: &InitialConditions) -> Self {
        Self {
            state: initial.state0,
            vstate: initial.vstate0,
            vartheta: initial.vartheta0,
            sigma: initial.state0.saturating_sub(initial.vstate0),
            ..Self::default()
        }
    }
}
