//! Additive disturbance ν injected into the state update.
//!
//! Two shapes, both driven by a sample counter that wraps at `samples`:
//!
//! ```text
//! m  = amp·(rand() − offset)                         rand() ∈ [0, 1)
//! Sinusoidal:  ν = m + β + A·sin(2π·f·(t − φ)),      t = counter·dt
//! Random:      ν = m
//! ```
//!
//! Amplitudes, offset, bias and phase travel scaled like every other value;
//! the frequency is in plain hertz.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::scale::ScaleConfig;
use crate::{Fixed, Float};

/// Disturbance shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisturbanceMode {
    /// Uniform noise plus bias plus sinusoid.
    #[default]
    Sinusoidal,
    /// Uniform noise only.
    Random,
}

impl TryFrom<u8> for DisturbanceMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Sinusoidal),
            1 => Ok(Self::Random),
            other => Err(Error::UnknownDisturbanceMode(other)),
        }
    }
}

/// Disturbance parameters as configured over serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisturbanceConfig {
    pub enabled: bool,
    pub mode: DisturbanceMode,
    pub amplitude: Fixed,
    pub offset: Fixed,
    pub beta: Fixed,
    pub sin_amplitude: Fixed,
    pub frequency: Fixed,
    pub phase: Fixed,
    /// Counter period; must be > 0.
    pub samples: u32,
}

impl Default for DisturbanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: DisturbanceMode::Sinusoidal,
            amplitude: 0,
            offset: 0,
            beta: 0,
            sin_amplitude: 0,
            frequency: 0,
            phase: 0,
            samples: 1,
        }
    }
}

impl DisturbanceConfig {
    /// Disabled disturbance.
    pub fn off() -> Self {
        Self::default()
    }

    /// Reject `samples = 0`.
    pub fn validate(&self) -> Result<()> {
        if self.samples == 0 {
            return Err(Error::ZeroSamples);
        }
        Ok(())
    }
}

/// Stateful generator: configuration, sample counter and noise source.
#[derive(Debug, Clone)]
pub struct DisturbanceGenerator {
    config: DisturbanceConfig,
    counter: u32,
    rng: StdRng,
}

impl DisturbanceGenerator {
    /// Disabled generator with a deterministic noise seed.
    pub fn new(seed: u64) -> Self {
        Self {
            config: DisturbanceConfig::off(),
            counter: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generator with an initial configuration.
    pub fn with_config(config: DisturbanceConfig, seed: u64) -> Result<Self> {
        let mut generator = Self::new(seed);
        generator.configure(config)?;
        Ok(generator)
    }

    /// Current configuration.
    pub fn config(&self) -> &DisturbanceConfig {
        &self.config
    }

    /// Replace the configuration, keeping `counter < samples`.
    ///
    /// An invalid configuration is rejected and the previous one stays.
    pub fn configure(&mut self, config: DisturbanceConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.counter %= config.samples;
        Ok(())
    }

    /// Current sample counter.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Rewind the counter for a new run.
    pub fn reset(&mut self) {
        self.counter = 0;
    }

    /// Value for the current sample, then advance the counter.
    ///
    /// `dt` is the step in seconds. Disabled disturbance yields exactly zero but
    /// still advances the counter.
    pub fn next(&mut self, scale: &ScaleConfig, dt: Float) -> Float {
        let nu = if self.config.enabled {
            self.sample(scale, dt)
        } else {
            0.0
        };
        self.counter = (self.counter + 1) % self.config.samples;
        nu
    }

    fn sample(&mut self, scale: &ScaleConfig, dt: Float) -> Float {
        let cfg = &self.config;
        let amp = scale.unscale(cfg.amplitude);
        let off = scale.unscale(cfg.offset);
        let noise = amp * (self.rng.gen::<Float>() - off);

        match cfg.mode {
            DisturbanceMode::Random => noise,
            DisturbanceMode::Sinusoidal => {
                let beta = scale.unscale(cfg.beta);
                let a = scale.unscale(cfg.sin_amplitude);
                let f = cfg.frequency as Float;
                let phi = scale.unscale(cfg.phase);
                let t = self.counter as Float * dt;
                noise + beta + a * (2.0 * std::f32::consts::PI * f * (t - phi)).sin()
            }
        }
    }
}
