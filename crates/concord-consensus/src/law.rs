//! Control law family.
//!
//! One pipeline, several strategies:
//!
//! ```text
//! unscale → neighbor aggregation → strategy → Euler step → clamp ≥ 0 → rescale
//! ```
//!
//! [`step`] is pure. The disturbance value is sampled by the caller and passed
//! in, so a step can be replayed exactly.

use crate::error::{Error, Result};
use crate::neighbors::{NeighborTable, NodeIdentity};
use crate::scale::ScaleConfig;
use crate::state::DynamicState;
use crate::{Fixed, Float};

/// Multiplier from the integer `pole` parameter to the low-pass pole in rad/s.
pub const POLE_SCALE: Float = 0.01;

/// Which control law the fast path runs.
///
/// Discriminants are the selector values used by the `a` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum AlgorithmKind {
    /// Bang-bang on the neighbor error, gain grows while neighbors disagree.
    Original = 0,
    /// Proportional on the neighbor error, fixed gain.
    Integral = 1,
    /// PI on the low-pass split of the neighbor error.
    PiLpf = 2,
    /// Finite-time diffusion with adaptive gain and hysteresis.
    #[default]
    FiniteTime = 3,
}

impl AlgorithmKind {
    /// Selector value on the wire.
    pub fn selector(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for AlgorithmKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Original),
            1 => Ok(Self::Integral),
            2 => Ok(Self::PiLpf),
            3 => Ok(Self::FiniteTime),
            other => Err(Error::UnknownAlgorithm(other)),
        }
    }
}

/// Parameters fixed for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LawParams {
    pub algorithm: AlgorithmKind,
    pub scale: ScaleConfig,
    /// Step size in seconds.
    pub dt: Float,
    /// Adaptive gain rate, scaled by `scale.scale_eta`.
    pub eta: Fixed,
    /// Low-pass pole, scaled by [`POLE_SCALE`]. PI-LPF only.
    pub pole: Fixed,
}

/// Sign with `sign(0) = 0`.
pub fn sign(value: Float) -> Float {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Finite-time coupling `Σ −sign(z − z_j)·sqrt(|z − z_j|)` over enabled neighbors.
pub fn coupling(
    z: Float,
    neighbors: &NeighborTable,
    identity: &NodeIdentity,
    scale: &ScaleConfig,
) -> Float {
    neighbors
        .enabled_values(identity)
        .map(|zj| {
            let d = z - scale.unscale(zj);
            -sign(d) * d.abs().sqrt()
        })
        .sum()
}

/// Mean of `z_j − x` over enabled neighbors, zero when none is enabled.
pub fn mean_error(
    x: Float,
    neighbors: &NeighborTable,
    identity: &NodeIdentity,
    scale: &ScaleConfig,
) -> Float {
    let (sum, count) = neighbors
        .enabled_values(identity)
        .fold((0.0, 0u32), |(sum, count), zj| (sum + scale.unscale(zj) - x, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as Float
    }
}

/// Next value of the gain latch. The gain grows while the latch is set.
///
/// Idle switches on strictly above `epsilon_on`; active switches off at or
/// below `epsilon_off`.
fn hysteresis(active: bool, sigma: Float, scale: &ScaleConfig) -> bool {
    let magnitude = sigma.abs();
    if active {
        magnitude > scale.epsilon_off
    } else {
        magnitude > scale.epsilon_on
    }
}

/// Advance the dynamic state by one step of `params.dt`.
pub fn step(
    current: &DynamicState,
    neighbors: &NeighborTable,
    identity: &NodeIdentity,
    disturbance: Float,
    params: &LawParams,
) -> DynamicState {
    let scale = &params.scale;
    let dt = params.dt;
    let x = scale.unscale(current.state);
    let z = scale.unscale(current.vstate);
    let theta = scale.unscale(current.vartheta);
    let eta = scale.eta(params.eta);
    let sigma = x - z;

    let mut next = *current;

    let (x_new, z_new, dtheta) = match params.algorithm {
        AlgorithmKind::FiniteTime => {
            let gi = coupling(z, neighbors, identity, scale);
            let ui = gi - theta * sign(sigma);
            next.active = hysteresis(current.active, sigma, scale);
            next.gi = gi;
            next.ui = ui;
            let dtheta = if next.active { eta } else { 0.0 };
            (x + dt * (ui + disturbance), z + dt * gi, dtheta)
        }
        AlgorithmKind::Original => {
            let e = mean_error(x, neighbors, identity, scale);
            let ui = theta * sign(e);
            next.gi = e;
            next.ui = ui;
            let x_new = x + dt * (ui + disturbance);
            (x_new, x_new, eta * sign(e).abs())
        }
        AlgorithmKind::Integral => {
            let e = mean_error(x, neighbors, identity, scale);
            let ui = theta * e;
            next.gi = e;
            next.ui = ui;
            let x_new = x + dt * (ui + disturbance);
            (x_new, x_new, 0.0)
        }
        AlgorithmKind::PiLpf => {
            let e = mean_error(x, neighbors, identity, scale);
            let pole = params.pole as Float * POLE_SCALE;
            let error_dc = current.error_dc + dt * pole * (e - current.error_dc);
            let integral = current.integral + dt * eta * error_dc;
            let ui = theta * (e - error_dc) + integral;
            next.error_dc = error_dc;
            next.integral = integral;
            next.gi = e;
            next.ui = ui;
            let x_new = x + dt * (ui + disturbance);
            (x_new, x_new, 0.0)
        }
    };

    // f32::max maps NaN to the other operand
    let x_new = x_new.max(0.0);
    let z_new = z_new.max(0.0);
    let theta_new = (theta + dt * dtheta).max(0.0);

    next.state = scale.rescale(x_new);
    next.vstate = scale.rescale(z_new);
    next.vartheta = scale.rescale(theta_new);
    next.sigma = scale.rescale(sigma);
    next
}
