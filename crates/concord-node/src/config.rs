//! Node configuration.
//!
//! Resolution order: built-in defaults, then the JSON file named by
//! `CONCORD_CONFIG` (any subset of fields), then individual `CONCORD_*`
//! variables.

use std::path::Path;
use std::str::FromStr;

use concord_consensus::{
    AlgorithmConfig, AlgorithmKind, ConsensusEngine, InitialConditions, ScaleConfig,
    DEFAULT_PERIOD_MS, DEFAULT_STEP_MS,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::radio::RadioConfig;

/// Configuration for a concord node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Fixed-point scale and hysteresis band; must match across the network
    pub scale: ScaleConfig,

    /// Slow-path period until the first `a` command
    pub period_ms: u32,

    /// Fast-path period until the first `a` command
    pub step_ms: u32,

    /// Control law until an `a` command selects another
    pub algorithm: AlgorithmKind,

    /// Low-pass pole for PI-LPF, scaled by 0.01
    pub pole: i32,

    /// Seed of the disturbance noise
    pub seed: u64,

    /// UDP broadcast stand-in for the radio
    pub radio: RadioConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            scale: ScaleConfig::default(),
            period_ms: DEFAULT_PERIOD_MS,
            step_ms: DEFAULT_STEP_MS,
            algorithm: AlgorithmKind::default(),
            pole: 0,
            seed: 0,
            radio: RadioConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load with a custom variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("CONCORD_CONFIG") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        override_with(&lookup, "CONCORD_SCALE_FACTOR", &mut config.scale.scale_factor)?;
        override_with(&lookup, "CONCORD_SCALE_ETA", &mut config.scale.scale_eta)?;
        override_with(&lookup, "CONCORD_EPSILON_ON", &mut config.scale.epsilon_on)?;
        override_with(&lookup, "CONCORD_EPSILON_OFF", &mut config.scale.epsilon_off)?;
        override_with(&lookup, "CONCORD_TS_MS", &mut config.period_ms)?;
        override_with(&lookup, "CONCORD_DT_MS", &mut config.step_ms)?;
        override_with(&lookup, "CONCORD_POLE", &mut config.pole)?;
        override_with(&lookup, "CONCORD_SEED", &mut config.seed)?;
        override_with(&lookup, "CONCORD_BIND_ADDR", &mut config.radio.bind)?;
        override_with(&lookup, "CONCORD_BROADCAST_ADDR", &mut config.radio.broadcast)?;
        override_with(&lookup, "CONCORD_ADVERTISE_MS", &mut config.radio.advertise_interval_ms)?;

        let mut selector = config.algorithm.selector();
        override_with(&lookup, "CONCORD_ALGORITHM", &mut selector)?;
        config.algorithm = AlgorithmKind::try_from(selector)?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON file; missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Check the values the engine would otherwise reject later.
    pub fn validate(&self) -> Result<()> {
        self.scale.validate()?;
        self.boot_algorithm().validate()?;
        if self.radio.advertise_interval_ms == 0 {
            return Err(Error::Config("advertise interval must be greater than zero".into()));
        }
        Ok(())
    }

    /// Engine preloaded with these defaults.
    pub fn build_engine(&self) -> Result<ConsensusEngine> {
        let mut engine = ConsensusEngine::new(self.scale, self.seed)?;
        engine.configure_algorithm(self.boot_algorithm())?;
        Ok(engine)
    }

    fn boot_algorithm(&self) -> AlgorithmConfig {
        AlgorithmConfig {
            period_ms: self.period_ms,
            step_ms: self.step_ms,
            initial: InitialConditions::default(),
            eta: 0,
            algorithm: Some(self.algorithm),
            pole: Some(self.pole),
        }
    }
}

fn override_with<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid {}: {:?}", key, raw)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = NodeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.period_ms, 1000);
        assert_eq!(config.step_ms, 1);
    }

    #[test]
    fn environment_overrides() {
        let config = NodeConfig::from_lookup(lookup(&[
            ("CONCORD_SCALE_FACTOR", "1000000"),
            ("CONCORD_TS_MS", "250"),
            ("CONCORD_ALGORITHM", "2"),
            ("CONCORD_BIND_ADDR", "127.0.0.1:0"),
        ]))
        .unwrap();
        assert_eq!(config.scale.scale_factor, 1e6);
        assert_eq!(config.period_ms, 250);
        assert_eq!(config.algorithm, AlgorithmKind::PiLpf);
        assert_eq!(config.radio.bind.port(), 0);
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(matches!(
            NodeConfig::from_lookup(lookup(&[("CONCORD_DT_MS", "fast")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            NodeConfig::from_lookup(lookup(&[("CONCORD_DT_MS", "0")])),
            Err(Error::Consensus(_))
        ));
        assert!(matches!(
            NodeConfig::from_lookup(lookup(&[("CONCORD_ALGORITHM", "7")])),
            Err(Error::Consensus(_))
        ));
        assert!(matches!(
            NodeConfig::from_lookup(lookup(&[("CONCORD_EPSILON_OFF", "0.5")])),
            Err(Error::Consensus(_))
        ));
    }

    #[test]
    fn json_file_then_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "seed": 42, "scale": {{ "scale_factor": 1000000.0 }}, "period_ms": 500 }}"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().into_owned();
        let config = NodeConfig::from_lookup(lookup(&[
            ("CONCORD_CONFIG", path.as_str()),
            ("CONCORD_TS_MS", "200"),
        ]))
        .unwrap();

        assert_eq!(config.seed, 42);
        assert_eq!(config.scale.scale_factor, 1e6);
        assert_eq!(config.scale.epsilon_on, ScaleConfig::default().epsilon_on);
        assert_eq!(config.period_ms, 200);
    }

    #[test]
    fn malformed_file_is_json_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ seed: ").unwrap();
        let path = file.path().to_string_lossy().into_owned();
        assert!(matches!(
            NodeConfig::from_lookup(lookup(&[("CONCORD_CONFIG", path.as_str())])),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            NodeConfig::from_lookup(lookup(&[("CONCORD_CONFIG", "/nonexistent/concord.json")])),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn engine_starts_with_configured_law() {
        let config = NodeConfig {
            algorithm: AlgorithmKind::Integral,
            period_ms: 300,
            ..NodeConfig::default()
        };
        let engine = config.build_engine().unwrap();
        assert_eq!(engine.algorithm(), AlgorithmKind::Integral);
        assert_eq!(engine.run_config().period_ms, 300);
    }
}
