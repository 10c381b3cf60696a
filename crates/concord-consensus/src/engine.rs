//! The consensus engine: configuration, lifecycle and the dynamic state.
//!
//! One value owns the whole record. The schedulers share it behind a lock and
//! go through the methods here for every read and write.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::disturbance::{DisturbanceConfig, DisturbanceGenerator};
use crate::error::{Error, Result};
use crate::law::{self, AlgorithmKind, LawParams};
use crate::neighbors::{NeighborTable, NodeIdentity};
use crate::scale::ScaleConfig;
use crate::state::{DynamicState, InitialConditions};
use crate::{Fixed, Float};

/// Default slow-path period (Ts).
pub const DEFAULT_PERIOD_MS: u32 = 1000;

/// Default fast-path period (dt).
pub const DEFAULT_STEP_MS: u32 = 1;

/// Run flags and periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Set by trigger-start, cleared by trigger-stop.
    pub running: bool,
    /// Whether this node participates numerically.
    pub enabled: bool,
    /// One-time setup for the current run is still pending.
    pub first_run: bool,
    /// Slow-path period in milliseconds.
    pub period_ms: u32,
    /// Fast-path period in milliseconds.
    pub step_ms: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            running: false,
            enabled: false,
            first_run: false,
            period_ms: DEFAULT_PERIOD_MS,
            step_ms: DEFAULT_STEP_MS,
        }
    }
}

/// Contents of an `n` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    pub enabled: bool,
    pub identity: NodeIdentity,
}

/// Contents of an `a` command.
///
/// `algorithm` and `pole` are optional; `None` keeps the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmConfig {
    pub period_ms: u32,
    pub step_ms: u32,
    pub initial: InitialConditions,
    pub eta: Fixed,
    pub algorithm: Option<AlgorithmKind>,
    pub pole: Option<Fixed>,
}

impl AlgorithmConfig {
    /// Both periods must be non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.period_ms == 0 {
            return Err(Error::InvalidTiming("Ts must be greater than zero".into()));
        }
        if self.step_ms == 0 {
            return Err(Error::InvalidTiming("dt must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Where the engine is in its run cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Never started.
    Idle,
    /// Started, waiting for the slow path to run one-time setup.
    Armed,
    /// Fast path live.
    Running,
    /// Stopped after a run; the last dynamic state is kept.
    Stopped,
}

/// Timer action the slow path must take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Stop,
}

/// Everything one telemetry line needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub elapsed_ms: u64,
    pub state: Fixed,
    pub vstate: Fixed,
    pub vartheta: Fixed,
    /// Observed value of each configured neighbor, in slot order.
    pub neighbor_values: Vec<Fixed>,
}

/// What trigger-start latched for the current run.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveRun {
    law: LawParams,
    period_ms: u32,
    step_ms: u32,
}

/// Owner of configuration, lifecycle, dynamic state and neighbor table.
///
/// `a` and `p` commands change the configuration at any time, but a run keeps
/// the law parameters and periods it was started with.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    scale: ScaleConfig,
    run: RunConfig,
    active: ActiveRun,
    identity: NodeIdentity,
    initial: InitialConditions,
    eta: Fixed,
    algorithm: AlgorithmKind,
    pole: Fixed,
    state: DynamicState,
    neighbors: NeighborTable,
    disturbance: DisturbanceGenerator,
    started_at: Option<Instant>,
    timer_active: bool,
    has_run: bool,
}

impl ConsensusEngine {
    /// Idle engine with default parameters.
    pub fn new(scale: ScaleConfig, seed: u64) -> Result<Self> {
        scale.validate()?;
        let initial = InitialConditions::default();
        let mut neighbors = NeighborTable::new();
        neighbors.reset(initial.vstate0);
        let run = RunConfig::default();
        let algorithm = AlgorithmKind::default();
        Ok(Self {
            scale,
            run,
            active: ActiveRun {
                law: LawParams {
                    algorithm,
                    scale,
                    dt: run.step_ms as Float / 1000.0,
                    eta: 0,
                    pole: 0,
                },
                period_ms: run.period_ms,
                step_ms: run.step_ms,
            },
            identity: NodeIdentity::default(),
            initial,
            eta: 0,
            algorithm,
            pole: 0,
            state: DynamicState::from_initial(&initial),
            neighbors,
            disturbance: DisturbanceGenerator::new(seed),
            started_at: None,
            timer_active: false,
            has_run: false,
        })
    }

    /// Apply an `n` command.
    ///
    /// A changed identity invalidates the table, so it is re-seeded. While a
    /// run is active the identity is fixed and only `enabled` may change.
    pub fn configure_network(&mut self, config: NetworkConfig) -> Result<()> {
        if config.identity != self.identity {
            if self.run.running {
                warn!(
                    node_id = config.identity.node_id(),
                    neighbors = ?config.identity.neighbor_ids(),
                    "Network change ignored while running"
                );
                return Err(Error::InvalidNetwork(
                    "cannot change node or neighbor ids while running".into(),
                ));
            }
            self.neighbors.reset(self.initial.vstate0);
        }
        self.identity = config.identity;
        self.run.enabled = config.enabled;
        info!(
            node_id = config.identity.node_id(),
            neighbors = ?config.identity.neighbor_ids(),
            enabled = config.enabled,
            "Network configured"
        );
        Ok(())
    }

    /// Apply an `a` command. Takes effect on the next trigger-start; a run in
    /// progress keeps its periods and law parameters.
    pub fn configure_algorithm(&mut self, config: AlgorithmConfig) -> Result<()> {
        config.validate()?;
        self.run.period_ms = config.period_ms;
        self.run.step_ms = config.step_ms;
        self.initial = config.initial;
        self.eta = config.eta;
        if let Some(algorithm) = config.algorithm {
            self.algorithm = algorithm;
        }
        if let Some(pole) = config.pole {
            self.pole = pole;
        }
        info!(
            ts_ms = config.period_ms,
            dt_ms = config.step_ms,
            state0 = config.initial.state0,
            vstate0 = config.initial.vstate0,
            vartheta0 = config.initial.vartheta0,
            eta = config.eta,
            algorithm = ?self.algorithm,
            "Algorithm configured"
        );
        Ok(())
    }

    /// Apply a `p` command. `samples = 0` is rejected.
    pub fn configure_disturbance(&mut self, config: DisturbanceConfig) -> Result<()> {
        self.disturbance.configure(config)?;
        info!(
            enabled = config.enabled,
            mode = ?config.mode,
            samples = config.samples,
            "Disturbance configured"
        );
        Ok(())
    }

    /// Trigger-start: reset the run and arm one-time setup.
    ///
    /// A start while already running restarts the run without touching the
    /// fast-path timer.
    pub fn start(&mut self, now: Instant) {
        self.state = DynamicState::from_initial(&self.initial);
        self.neighbors.reset(self.initial.vstate0);
        self.disturbance.reset();
        self.started_at = Some(now);
        self.has_run = true;
        let mut active = ActiveRun {
            law: self.law_params(),
            period_ms: self.run.period_ms,
            step_ms: self.run.step_ms,
        };
        if self.run.running {
            // the fast timer keeps its period across a restart
            active.step_ms = self.active.step_ms;
            active.law.dt = self.active.law.dt;
        }
        self.active = active;
        if !self.run.running {
            self.run.running = true;
            self.run.first_run = true;
        }
        info!(
            state0 = self.initial.state0,
            vstate0 = self.initial.vstate0,
            enabled = self.run.enabled,
            "Consensus started"
        );
    }

    /// Trigger-stop. The dynamic state is left as is.
    pub fn stop(&mut self) {
        if !self.run.running {
            debug!("Stop while not running");
            return;
        }
        self.run.running = false;
        self.run.first_run = false;
        info!(state = self.state.state, vstate = self.state.vstate, "Consensus stopped");
    }

    /// Pending timer action, returned once per start or stop.
    pub fn take_transition(&mut self) -> Option<Transition> {
        if self.run.running && self.run.first_run {
            self.run.first_run = false;
            self.timer_active = true;
            Some(Transition::Start)
        } else if !self.run.running && self.timer_active {
            self.timer_active = false;
            Some(Transition::Stop)
        } else {
            None
        }
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        match (self.run.running, self.run.first_run) {
            (true, true) => Lifecycle::Armed,
            (true, false) => Lifecycle::Running,
            (false, _) if self.has_run => Lifecycle::Stopped,
            (false, _) => Lifecycle::Idle,
        }
    }

    /// Whether a fast-path tick should step the law.
    pub fn is_stepping(&self) -> bool {
        self.run.running && self.run.enabled && self.timer_active
    }

    /// One fast-path tick. Returns whether the state advanced.
    pub fn step(&mut self) -> bool {
        if !self.is_stepping() {
            return false;
        }
        let params = self.active.law;
        let nu = self.disturbance.next(&params.scale, params.dt);
        self.state = law::step(&self.state, &self.neighbors, &self.identity, nu, &params);
        true
    }

    /// Record a neighbor report, returning the quorum flag.
    ///
    /// Values reach the law only once every neighbor has been heard.
    /// Observing-only nodes note availability but keep the seeded values.
    pub fn observe(&mut self, node_id: u8, value: Fixed, enabled: bool) -> bool {
        let before = self.neighbors.all_observed();
        let after = if self.run.enabled {
            self.neighbors.observe(&self.identity, node_id, value, enabled)
        } else {
            self.neighbors.mark_seen(&self.identity, node_id)
        };
        if after && !before {
            info!(neighbors = self.identity.len(), "All neighbors observed");
        }
        after
    }

    /// Telemetry snapshot relative to the run start.
    pub fn snapshot(&self, now: Instant) -> TelemetrySnapshot {
        let elapsed_ms = self
            .started_at
            .map(|t| now.saturating_duration_since(t).as_millis() as u64)
            .unwrap_or(0);
        TelemetrySnapshot {
            elapsed_ms,
            state: self.state.state,
            vstate: self.state.vstate,
            vartheta: self.state.vartheta,
            neighbor_values: self
                .neighbors
                .slots(&self.identity)
                .iter()
                .map(|s| s.observed_value)
                .collect(),
        }
    }

    /// Law parameters the current (or last) run steps with.
    pub fn active_params(&self) -> LawParams {
        self.active.law
    }

    /// Law parameters for the current configuration, used from the next start.
    pub fn law_params(&self) -> LawParams {
        LawParams {
            algorithm: self.algorithm,
            scale: self.scale,
            dt: self.run.step_ms as Float / 1000.0,
            eta: self.eta,
            pole: self.pole,
        }
    }

    /// Replace the scale. Rejected while a run is active.
    pub fn set_scale(&mut self, scale: ScaleConfig) -> Result<()> {
        scale.validate()?;
        if self.run.running {
            warn!("Scale change ignored while running");
            return Err(Error::InvalidScale("cannot change scale while running".into()));
        }
        self.scale = scale;
        Ok(())
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn scale(&self) -> &ScaleConfig {
        &self.scale
    }

    pub fn initial(&self) -> &InitialConditions {
        &self.initial
    }

    pub fn algorithm(&self) -> AlgorithmKind {
        self.algorithm
    }

    pub fn state(&self) -> &DynamicState {
        &self.state
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub fn disturbance(&self) -> &DisturbanceConfig {
        self.disturbance.config()
    }

    /// Value this node broadcasts.
    pub fn broadcast_value(&self) -> Fixed {
        self.state.vstate
    }

    /// Whether this node participates numerically.
    pub fn is_enabled(&self) -> bool {
        self.run.enabled
    }

    /// Fast-path period: the run's while running, the configured one otherwise.
    pub fn step_period(&self) -> Duration {
        let ms = if self.run.running {
            self.active.step_ms
        } else {
            self.run.step_ms
        };
        Duration::from_millis(ms as u64)
    }

    /// Slow-path period: the run's while running, the configured one otherwise.
    pub fn slow_period(&self) -> Duration {
        let ms = if self.run.running {
            self.active.period_ms
        } else {
            self.run.period_ms
        };
        Duration::from_millis(ms as u64)
    }
}
