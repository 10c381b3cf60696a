//! Concord node - wires the engine to its collaborators.
//!
//! Architecture:
//! - One [`ConsensusEngine`] behind a tokio mutex
//! - Scheduler task (slow path) owning the fast path
//! - Radio tasks feeding the neighbor inbox
//! - Serial reader applying commands

use std::sync::Arc;

use concord_consensus::ConsensusEngine;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::error::Result;
use crate::inbox::NeighborInbox;
use crate::radio::{Radio, StdoutSink, TelemetrySink, UdpRadio};
use crate::scheduler::{Scheduler, SharedEngine};
use crate::serial::run_serial;

/// A concord node instance.
pub struct ConcordNode {
    config: NodeConfig,
    engine: SharedEngine,
    inbox: Arc<NeighborInbox>,
    scheduler: Scheduler,
    shutdown: watch::Sender<bool>,
}

impl ConcordNode {
    /// Build a node around the given collaborators.
    pub fn new(
        config: NodeConfig,
        radio: Arc<dyn Radio>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Result<Self> {
        config.validate()?;
        let engine: SharedEngine = Arc::new(Mutex::new(config.build_engine()?));
        let inbox = Arc::new(NeighborInbox::new());
        let scheduler = Scheduler::new(Arc::clone(&engine), Arc::clone(&inbox), radio, sink);
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            config,
            engine,
            inbox,
            scheduler,
            shutdown,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Shared engine handle.
    pub fn engine(&self) -> SharedEngine {
        Arc::clone(&self.engine)
    }

    /// Where received neighbor reports go.
    pub fn inbox(&self) -> Arc<NeighborInbox> {
        Arc::clone(&self.inbox)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Receiver that flips to `true` on shutdown.
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Spawn the scheduler.
    pub fn start(&self) -> JoinHandle<()> {
        self.scheduler.spawn(self.subscribe_shutdown())
    }

    /// Signal every task to stop.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Lock the engine for inspection.
    pub async fn with_engine<R>(&self, f: impl FnOnce(&mut ConsensusEngine) -> R) -> R {
        let mut engine = self.engine.lock().await;
        f(&mut engine)
    }
}

/// Run a hosted node: UDP radio, stdin commands, stdout telemetry, until Ctrl-C.
pub async fn run(config: NodeConfig) -> Result<()> {
    let radio = Arc::new(UdpRadio::bind(config.radio.clone())?);
    let node = ConcordNode::new(config, radio.clone(), Arc::new(StdoutSink))?;

    let mut tasks = radio.spawn(node.inbox(), node.subscribe_shutdown())?;
    tasks.push(node.start());
    let serial = tokio::spawn(run_serial(
        tokio::io::stdin(),
        node.engine(),
        node.subscribe_shutdown(),
    ));

    info!("Concord node running");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    node.shutdown();

    for task in tasks {
        if let Err(e) = task.await {
            warn!("Task ended abnormally: {}", e);
        }
    }
    // a pending stdin read cannot be interrupted
    serial.abort();
    Ok(())
}
