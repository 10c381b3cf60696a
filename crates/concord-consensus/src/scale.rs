//! Fixed-point scaling and hysteresis thresholds.

use crate::error::{Error, Result};
use crate::{Fixed, Float};

/// Scaling between the wire's `i32` domain and the control law's `f32` domain.
///
/// Set once at configuration time. Nodes of the same network must share it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScaleConfig {
    /// Multiplier from float to fixed.
    pub scale_factor: Float,
    /// Multiplier applied to the integer `eta` parameter.
    pub scale_eta: Float,
    /// |σ| above which the adaptive gain starts growing.
    pub epsilon_on: Float,
    /// |σ| at or below which the adaptive gain stops growing.
    pub epsilon_off: Float,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            scale_factor: 1000.0,
            scale_eta: 1e-4,
            epsilon_on: 0.075,
            epsilon_off: 0.010,
        }
    }
}

impl ScaleConfig {
    /// Create a validated scale configuration.
    pub fn new(
        scale_factor: Float,
        scale_eta: Float,
        epsilon_on: Float,
        epsilon_off: Float,
    ) -> Result<Self> {
        let scale = Self {
            scale_factor,
            scale_eta,
            epsilon_on,
            epsilon_off,
        };
        scale.validate()?;
        Ok(scale)
    }

    /// Check `scale_factor > 0`, `scale_eta > 0` and `0 ≤ epsilon_off ≤ epsilon_on`.
    pub fn validate(&self) -> Result<()> {
        if !(self.scale_factor.is_finite() && self.scale_factor > 0.0) {
            return Err(Error::InvalidScale(format!(
                "scale_factor must be positive, got {}",
                self.scale_factor
            )));
        }
        if !(self.scale_eta.is_finite() && self.scale_eta > 0.0) {
            return Err(Error::InvalidScale(format!(
                "scale_eta must be positive, got {}",
                self.scale_eta
            )));
        }
        if !(self.epsilon_off >= 0.0
            && self.epsilon_off <= self.epsilon_on
            && self.epsilon_on.is_finite())
        {
            return Err(Error::InvalidScale(format!(
                "hysteresis band requires 0 <= epsilon_off ({}) <= epsilon_on ({})",
                self.epsilon_off, self.epsilon_on
            )));
        }
        Ok(())
    }

    /// Reciprocal of the scale factor.
    pub fn inv_scale_factor(&self) -> Float {
        1.0 / self.scale_factor
    }

    /// Fixed to float.
    pub fn unscale(&self, value: Fixed) -> Float {
        value as Float * self.inv_scale_factor()
    }

    /// Float to fixed, rounded to the nearest integer.
    ///
    /// Saturates at the `i32` bounds; NaN maps to zero.
    pub fn rescale(&self, value: Float) -> Fixed {
        (value * self.scale_factor).round() as Fixed
    }

    /// Integer `eta` to its float rate.
    pub fn eta(&self, eta: Fixed) -> Float {
        eta as Float * self.scale_eta
    }
}
