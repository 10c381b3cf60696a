//! Serial command protocol.
//!
//! A command is one line terminated by CR or LF. The first byte is the type,
//! the rest is a comma-separated list of integers:
//!
//! | Type | Fields |
//! |------|--------|
//! | `t`  | trigger byte: `0` stops, anything else (or nothing) starts |
//! | `n`  | `enabled, node_id[, neighbor_id...]` (up to `N_MAX` neighbors) |
//! | `a`  | `Ts, dt, state0, vstate0, vartheta0, eta[, algorithm[, pole]]` |
//! | `p`  | `on, amplitude, offset, beta, A, frequency, phase, samples[, mode]` |
//!
//! A line is either parsed and validated in full or rejected as a whole.

use std::time::Instant;

use bytes::{Bytes, BytesMut};
use concord_consensus::{
    AlgorithmConfig, AlgorithmKind, ConsensusEngine, DisturbanceConfig, DisturbanceMode,
    InitialConditions, NetworkConfig, NodeIdentity, N_MAX,
};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Longest accepted command line, terminator excluded.
pub const MAX_LINE_LEN: usize = 128;

/// Trigger action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Start,
    Stop,
}

/// A fully validated command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Trigger(Trigger),
    Network(NetworkConfig),
    Algorithm(AlgorithmConfig),
    Disturbance(DisturbanceConfig),
}

impl Command {
    /// Type byte of this command.
    pub fn type_byte(&self) -> char {
        match self {
            Command::Trigger(_) => 't',
            Command::Network(_) => 'n',
            Command::Algorithm(_) => 'a',
            Command::Disturbance(_) => 'p',
        }
    }

    /// Apply to the engine. `now` timestamps a trigger-start.
    pub fn apply(self, engine: &mut ConsensusEngine, now: Instant) -> Result<()> {
        match self {
            Command::Trigger(Trigger::Start) => engine.start(now),
            Command::Trigger(Trigger::Stop) => engine.stop(),
            Command::Network(config) => engine.configure_network(config)?,
            Command::Algorithm(config) => engine.configure_algorithm(config)?,
            Command::Disturbance(config) => engine.configure_disturbance(config)?,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    /// 0 or 1
    Flag,
    /// Node id, u8
    Id,
    /// Scaled value, i32
    Value,
    /// Milliseconds or sample counts, u32
    Count,
    /// Enumeration selector, u8
    Selector,
}

impl FieldKind {
    fn range(self) -> (i64, i64) {
        match self {
            FieldKind::Flag => (0, 1),
            FieldKind::Id | FieldKind::Selector => (0, u8::MAX as i64),
            FieldKind::Value => (i32::MIN as i64, i32::MAX as i64),
            FieldKind::Count => (0, u32::MAX as i64),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Field {
    name: &'static str,
    kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> Field {
    Field { name, kind }
}

/// Field table of one command type.
struct Schema {
    command: char,
    required: usize,
    fields: &'static [Field],
}

const NETWORK: Schema = Schema {
    command: 'n',
    required: 2,
    fields: &[
        field("enabled", FieldKind::Flag),
        field("node_id", FieldKind::Id),
        field("neighbor_1", FieldKind::Id),
        field("neighbor_2", FieldKind::Id),
        field("neighbor_3", FieldKind::Id),
        field("neighbor_4", FieldKind::Id),
    ],
};

const _: () = assert!(NETWORK.fields.len() == NETWORK.required + N_MAX);

const ALGORITHM: Schema = Schema {
    command: 'a',
    required: 6,
    fields: &[
        field("Ts", FieldKind::Count),
        field("dt", FieldKind::Count),
        field("state0", FieldKind::Value),
        field("vstate0", FieldKind::Value),
        field("vartheta0", FieldKind::Value),
        field("eta", FieldKind::Value),
        field("algorithm", FieldKind::Selector),
        field("pole", FieldKind::Value),
    ],
};

const DISTURBANCE: Schema = Schema {
    command: 'p',
    required: 8,
    fields: &[
        field("on", FieldKind::Flag),
        field("amplitude", FieldKind::Value),
        field("offset", FieldKind::Value),
        field("beta", FieldKind::Value),
        field("A", FieldKind::Value),
        field("frequency", FieldKind::Value),
        field("phase", FieldKind::Value),
        field("samples", FieldKind::Count),
        field("mode", FieldKind::Selector),
    ],
};

impl Schema {
    /// Split and range-check the fields. Values fit the field's kind.
    fn parse(&self, rest: &str) -> Result<Vec<i64>> {
        let raw: Vec<&str> = if rest.trim().is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(str::trim).collect()
        };
        if raw.len() > self.fields.len() {
            return Err(Error::TooManyFields {
                command: self.command,
                max: self.fields.len(),
                got: raw.len(),
            });
        }
        if raw.len() < self.required {
            return Err(Error::MissingField {
                command: self.command,
                field: self.fields[raw.len()].name,
            });
        }
        raw.iter()
            .zip(self.fields)
            .map(|(text, field)| {
                let (min, max) = field.kind.range();
                text.parse::<i64>()
                    .ok()
                    .filter(|v| (min..=max).contains(v))
                    .ok_or_else(|| Error::InvalidField {
                        command: self.command,
                        field: field.name,
                        value: (*text).to_string(),
                    })
            })
            .collect()
    }
}

/// Parse one line, terminator optional.
pub fn parse_line(line: &[u8]) -> Result<Command> {
    let line = line.trim_ascii();
    let (&type_byte, rest) = line.split_first().ok_or(Error::EmptyLine)?;
    let rest = String::from_utf8_lossy(rest);

    match type_byte {
        b't' => Ok(Command::Trigger(if rest.starts_with('0') {
            Trigger::Stop
        } else {
            Trigger::Start
        })),
        b'n' => parse_network(&rest),
        b'a' => parse_algorithm(&rest),
        b'p' => parse_disturbance(&rest),
        other => Err(Error::UnknownType(other as char)),
    }
}

fn parse_network(rest: &str) -> Result<Command> {
    let v = NETWORK.parse(rest)?;
    let neighbors: Vec<u8> = v[2..].iter().map(|&id| id as u8).collect();
    let identity = NodeIdentity::new(v[1] as u8, &neighbors)?;
    Ok(Command::Network(NetworkConfig {
        enabled: v[0] == 1,
        identity,
    }))
}

fn parse_algorithm(rest: &str) -> Result<Command> {
    let v = ALGORITHM.parse(rest)?;
    let algorithm = v
        .get(6)
        .map(|&s| AlgorithmKind::try_from(s as u8))
        .transpose()?;
    let config = AlgorithmConfig {
        period_ms: v[0] as u32,
        step_ms: v[1] as u32,
        initial: InitialConditions {
            state0: v[2] as i32,
            vstate0: v[3] as i32,
            vartheta0: v[4] as i32,
        },
        eta: v[5] as i32,
        algorithm,
        pole: v.get(7).map(|&p| p as i32),
    };
    config.validate()?;
    Ok(Command::Algorithm(config))
}

fn parse_disturbance(rest: &str) -> Result<Command> {
    let v = DISTURBANCE.parse(rest)?;
    let mode = v
        .get(8)
        .map(|&m| DisturbanceMode::try_from(m as u8))
        .transpose()?
        .unwrap_or_default();
    let config = DisturbanceConfig {
        enabled: v[0] == 1,
        mode,
        amplitude: v[1] as i32,
        offset: v[2] as i32,
        beta: v[3] as i32,
        sin_amplitude: v[4] as i32,
        frequency: v[5] as i32,
        phase: v[6] as i32,
        samples: v[7] as u32,
    };
    config.validate()?;
    Ok(Command::Disturbance(config))
}

/// Splits a serial byte stream into command lines.
///
/// CR and LF both terminate a line; empty lines are skipped. A line longer
/// than [`MAX_LINE_LEN`] is dropped up to its terminator.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: BytesMut,
    overflow: bool,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every line they complete.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        let mut lines = Vec::new();
        for &byte in data {
            match byte {
                b'\r' | b'\n' => {
                    if self.overflow {
                        self.overflow = false;
                        self.buf.clear();
                    } else if !self.buf.is_empty() {
                        lines.push(self.buf.split().freeze());
                    }
                }
                _ if self.overflow => {}
                _ if self.buf.len() >= MAX_LINE_LEN => {
                    warn!(max = MAX_LINE_LEN, "Command line too long, dropping");
                    self.overflow = true;
                    self.buf.clear();
                }
                _ => self.buf.extend_from_slice(&[byte]),
            }
        }
        lines
    }

    /// Bytes of the line in progress.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Parse and apply one line, logging the outcome. The engine is untouched on error.
pub fn dispatch(line: &[u8], engine: &mut ConsensusEngine, now: Instant) -> Result<Command> {
    let result = parse_line(line).and_then(|command| command.apply(engine, now).map(|()| command));
    match &result {
        Ok(command) => debug!(command = %command.type_byte(), "Command applied"),
        Err(e) => warn!(error = %e, line = %hex::encode(line), "Command rejected"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_consensus::{Error as ConsensusError, ScaleConfig};
    use proptest::prelude::*;

    fn engine() -> ConsensusEngine {
        ConsensusEngine::new(ScaleConfig::default(), 1).unwrap()
    }

    #[test]
    fn trigger() {
        assert_eq!(parse_line(b"t1\r"), Ok(Command::Trigger(Trigger::Start)));
        assert_eq!(parse_line(b"t0\n"), Ok(Command::Trigger(Trigger::Stop)));
        assert_eq!(parse_line(b"t"), Ok(Command::Trigger(Trigger::Start)));
        assert_eq!(parse_line(b"tx"), Ok(Command::Trigger(Trigger::Start)));
    }

    #[test]
    fn network() {
        let Ok(Command::Network(config)) = parse_line(b"n1,3,1,2\r\n") else {
            panic!("expected network command");
        };
        assert!(config.enabled);
        assert_eq!(config.identity.node_id(), 3);
        assert_eq!(config.identity.neighbor_ids(), &[1, 2]);

        let Ok(Command::Network(config)) = parse_line(b"n0,7") else {
            panic!("expected network command");
        };
        assert!(!config.enabled);
        assert!(config.identity.is_empty());
    }

    #[test]
    fn network_rejections() {
        assert!(matches!(
            parse_line(b"n1,3,1,2,4,5,6"),
            Err(Error::TooManyFields { max: 6, got: 7, .. })
        ));
        assert!(matches!(
            parse_line(b"n1"),
            Err(Error::MissingField { field: "node_id", .. })
        ));
        assert!(matches!(
            parse_line(b"n1,3,3"),
            Err(Error::Rejected(ConsensusError::InvalidNetwork(_)))
        ));
        assert!(matches!(
            parse_line(b"n1,300"),
            Err(Error::InvalidField { field: "node_id", .. })
        ));
        assert!(matches!(
            parse_line(b"n2,3"),
            Err(Error::InvalidField { field: "enabled", .. })
        ));
    }

    #[test]
    fn algorithm_canonical_and_tail() {
        let Ok(Command::Algorithm(config)) = parse_line(b"a100,1,100,50,1,0") else {
            panic!("expected algorithm command");
        };
        assert_eq!(config.period_ms, 100);
        assert_eq!(config.step_ms, 1);
        assert_eq!(config.initial.state0, 100);
        assert_eq!(config.initial.vstate0, 50);
        assert_eq!(config.initial.vartheta0, 1);
        assert_eq!(config.eta, 0);
        assert_eq!(config.algorithm, None);
        assert_eq!(config.pole, None);

        let Ok(Command::Algorithm(config)) = parse_line(b"a100,1,100,50,1,0,2,250") else {
            panic!("expected algorithm command");
        };
        assert_eq!(config.algorithm, Some(AlgorithmKind::PiLpf));
        assert_eq!(config.pole, Some(250));
    }

    #[test]
    fn algorithm_rejections() {
        assert_eq!(
            parse_line(b"a100,1,100,50,1,0,9"),
            Err(Error::Rejected(ConsensusError::UnknownAlgorithm(9)))
        );
        assert!(matches!(
            parse_line(b"a0,1,100,50,1,0"),
            Err(Error::Rejected(ConsensusError::InvalidTiming(_)))
        ));
        assert!(matches!(
            parse_line(b"a100,1,100,50,1"),
            Err(Error::MissingField { field: "eta", .. })
        ));
        assert!(matches!(
            parse_line(b"a100,1,abc,50,1,0"),
            Err(Error::InvalidField { field: "state0", .. })
        ));
        assert!(matches!(
            parse_line(b"a100,1,99999999999,50,1,0"),
            Err(Error::InvalidField { field: "state0", .. })
        ));
    }

    #[test]
    fn disturbance() {
        let Ok(Command::Disturbance(config)) = parse_line(b"p1,100,500,10,1000,1,0,1000") else {
            panic!("expected disturbance command");
        };
        assert!(config.enabled);
        assert_eq!(config.mode, DisturbanceMode::Sinusoidal);
        assert_eq!(config.sin_amplitude, 1000);
        assert_eq!(config.samples, 1000);

        let Ok(Command::Disturbance(config)) = parse_line(b"p1,100,500,0,0,0,0,10,1") else {
            panic!("expected disturbance command");
        };
        assert_eq!(config.mode, DisturbanceMode::Random);

        assert_eq!(
            parse_line(b"p1,100,500,10,1000,1,0,0"),
            Err(Error::Rejected(ConsensusError::ZeroSamples))
        );
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert_eq!(parse_line(b"U100,1,100,50,1,0"), Err(Error::UnknownType('U')));
        assert_eq!(parse_line(b"x"), Err(Error::UnknownType('x')));
        assert_eq!(parse_line(b"\r\n"), Err(Error::EmptyLine));
    }

    #[test]
    fn rejected_line_leaves_engine_untouched() {
        let mut engine = engine();
        dispatch(b"a100,1,100,50,1,7", &mut engine, Instant::now()).unwrap();
        let before = engine.law_params();
        let initial = *engine.initial();

        assert!(dispatch(b"a200,2,1,1,1,1,9", &mut engine, Instant::now()).is_err());
        assert!(dispatch(b"U200,2,1,1,1,1", &mut engine, Instant::now()).is_err());
        assert_eq!(engine.law_params(), before);
        assert_eq!(*engine.initial(), initial);
    }

    #[test]
    fn network_change_rejected_while_running() {
        let mut engine = engine();
        dispatch(b"n1,3,1,2", &mut engine, Instant::now()).unwrap();
        dispatch(b"t1", &mut engine, Instant::now()).unwrap();

        assert!(matches!(
            dispatch(b"n1,3,1,4", &mut engine, Instant::now()),
            Err(Error::Rejected(ConsensusError::InvalidNetwork(_)))
        ));
        assert_eq!(engine.identity().neighbor_ids(), &[1, 2]);

        dispatch(b"t0", &mut engine, Instant::now()).unwrap();
        dispatch(b"n1,3,1,4", &mut engine, Instant::now()).unwrap();
        assert_eq!(engine.identity().neighbor_ids(), &[1, 4]);
    }

    #[test]
    fn repeated_commands_are_idempotent() {
        let lines: [&[u8]; 2] = [b"n1,3,1,2", b"a100,1,100,50,1,0,3,0"];
        let mut once = engine();
        for line in lines {
            dispatch(line, &mut once, Instant::now()).unwrap();
        }
        let mut twice = engine();
        for line in lines {
            dispatch(line, &mut twice, Instant::now()).unwrap();
            dispatch(line, &mut twice, Instant::now()).unwrap();
        }
        assert_eq!(once.run_config(), twice.run_config());
        assert_eq!(once.identity(), twice.identity());
        assert_eq!(once.initial(), twice.initial());
        assert_eq!(once.law_params(), twice.law_params());
    }

    #[test]
    fn framer_splits_on_cr_and_lf() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"t").is_empty());
        assert_eq!(framer.pending(), 1);
        let lines = framer.push(b"1\r\nn1,3,1\ra100");
        assert_eq!(lines, vec![Bytes::from_static(b"t1"), Bytes::from_static(b"n1,3,1")]);
        assert_eq!(framer.push(b",1,100,50,1,0\n"), vec![Bytes::from_static(b"a100,1,100,50,1,0")]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn framer_drops_overlong_line() {
        let mut framer = LineFramer::new();
        let long = vec![b'9'; MAX_LINE_LEN + 10];
        assert!(framer.push(b"a").is_empty());
        assert!(framer.push(&long).is_empty());
        assert_eq!(framer.push(b"\nt0\n"), vec![Bytes::from_static(b"t0")]);
    }

    #[test]
    fn framer_accepts_line_at_limit() {
        let mut framer = LineFramer::new();
        let mut line = vec![b'x'; MAX_LINE_LEN];
        line.push(b'\n');
        assert_eq!(framer.push(&line).len(), 1);
    }

    proptest! {
        #[test]
        fn garbage_never_mutates_engine(line in proptest::collection::vec(any::<u8>(), 0..64)) {
            let mut engine = engine();
            let before = engine.clone();
            if dispatch(&line, &mut engine, Instant::now()).is_err() {
                prop_assert_eq!(engine.run_config(), before.run_config());
                prop_assert_eq!(engine.identity(), before.identity());
                prop_assert_eq!(engine.law_params(), before.law_params());
                prop_assert_eq!(engine.disturbance(), before.disturbance());
            }
        }

        #[test]
        fn framer_output_has_no_terminators(
            chunks in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..40),
                0..8,
            ),
        ) {
            let mut framer = LineFramer::new();
            for chunk in chunks {
                for line in framer.push(&chunk) {
                    prop_assert!(!line.is_empty());
                    prop_assert!(line.len() <= MAX_LINE_LEN);
                    prop_assert!(!line.iter().any(|b| *b == b'\r' || *b == b'\n'));
                }
            }
        }
    }
}
