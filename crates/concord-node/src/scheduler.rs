//! Two-rate scheduler.
//!
//! - Fast path, period `dt`: a ticker posts to a semaphore holding at most
//!   one permit; a worker waits on it, steps the engine under its lock and
//!   hands the new value to the radio.
//! - Slow path, period `Ts`: waits (bounded) for neighbor reports, applies
//!   them, performs pending timer transitions and emits telemetry.
//!
//! Only the slow path starts or stops the fast path, once per transition.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use concord_consensus::{ConsensusEngine, Lifecycle, Transition};
use concord_protocols::{encode_telemetry, Advertisement};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::inbox::{NeighborInbox, NeighborSnapshot};
use crate::radio::{Radio, TelemetrySink};

/// Engine handle shared by both paths and the serial reader.
pub type SharedEngine = Arc<Mutex<ConsensusEngine>>;

/// Current time on the engine's clock.
pub fn engine_now() -> std::time::Instant {
    Instant::now().into_std()
}

/// Advertisement for the engine's current broadcast value.
pub fn advertisement(engine: &ConsensusEngine) -> Advertisement {
    Advertisement::new(engine.identity().node_id(), engine.broadcast_value(), engine.is_enabled())
}

/// Handle to a running fast path.
struct FastPath {
    stop: watch::Sender<bool>,
    ticker: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl FastPath {
    fn start(
        period: Duration,
        engine: SharedEngine,
        radio: Arc<dyn Radio>,
        missed: Arc<AtomicU64>,
    ) -> Self {
        let (stop, stop_rx) = watch::channel(false);
        let tick = Arc::new(Semaphore::new(0));
        let ticker = tokio::spawn(tick_loop(period, Arc::clone(&tick), missed, stop_rx.clone()));
        let worker = tokio::spawn(step_loop(tick, engine, radio, stop_rx));
        Self { stop, ticker, worker }
    }

    async fn stop(self) {
        let _ = self.stop.send(true);
        for task in [self.ticker, self.worker] {
            if let Err(e) = task.await {
                warn!("Fast path task ended abnormally: {}", e);
            }
        }
    }
}

async fn tick_loop(
    period: Duration,
    tick: Arc<Semaphore>,
    missed: Arc<AtomicU64>,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }
        // Single producer: nothing else adds permits, so the check cannot race.
        if tick.available_permits() == 0 {
            tick.add_permits(1);
        } else {
            let total = missed.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(total, "Fast path tick missed");
        }
    }
}

async fn step_loop(
    tick: Arc<Semaphore>,
    engine: SharedEngine,
    radio: Arc<dyn Radio>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            permit = tick.acquire() => match permit {
                Ok(permit) => permit.forget(),
                Err(_) => break,
            },
            _ = stop.changed() => break,
        }
        let mut engine = engine.lock().await;
        if engine.step() {
            radio.advertise(advertisement(&engine));
        }
    }
}

/// Fast and slow path driver for one engine.
#[derive(Clone)]
pub struct Scheduler {
    engine: SharedEngine,
    inbox: Arc<NeighborInbox>,
    radio: Arc<dyn Radio>,
    sink: Arc<dyn TelemetrySink>,
    missed: Arc<AtomicU64>,
}

impl Scheduler {
    pub fn new(
        engine: SharedEngine,
        inbox: Arc<NeighborInbox>,
        radio: Arc<dyn Radio>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            engine,
            inbox,
            radio,
            sink,
            missed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Fast-path ticks dropped because the previous one was still pending.
    pub fn missed_ticks(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }

    /// Spawn the slow path; it owns the fast path for its lifetime.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await })
    }

    /// Slow-path loop until `shutdown` flips or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Scheduler started");
        let mut fast: Option<FastPath> = None;
        let mut reported_missed = 0;
        let mut next = Instant::now();

        loop {
            let period = self.engine.lock().await.slow_period();
            let deadline = next + period;

            self.handle_transition(&mut fast).await;

            let received = tokio::select! {
                snapshot = self.inbox.recv_until(deadline) => snapshot,
                _ = shutdown.changed() => break,
            };
            if let Some(snapshot) = received {
                self.apply_reports(&snapshot).await;
            }

            self.emit_telemetry().await;

            let missed = self.missed_ticks();
            if missed > reported_missed {
                warn!(
                    missed = missed - reported_missed,
                    total = missed,
                    "Fast path deadlines missed"
                );
                reported_missed = missed;
            }

            tokio::select! {
                _ = sleep_until(deadline) => {}
                _ = shutdown.changed() => break,
            }
            next = deadline;
        }

        if let Some(fast) = fast.take() {
            fast.stop().await;
        }
        info!("Scheduler stopped");
    }

    async fn handle_transition(&self, fast: &mut Option<FastPath>) {
        let mut engine = self.engine.lock().await;
        match engine.take_transition() {
            Some(Transition::Start) => {
                // one-time setup: publish the initial advertisement first
                self.radio.advertise(advertisement(&engine));
                let period = engine.step_period();
                drop(engine);
                if let Some(previous) = fast.take() {
                    previous.stop().await;
                }
                *fast = Some(FastPath::start(
                    period,
                    Arc::clone(&self.engine),
                    Arc::clone(&self.radio),
                    Arc::clone(&self.missed),
                ));
                info!(dt_ms = period.as_millis() as u64, "Fast path started");
            }
            Some(Transition::Stop) => {
                drop(engine);
                if let Some(previous) = fast.take() {
                    previous.stop().await;
                }
                info!("Fast path stopped");
            }
            None => {}
        }
    }

    async fn apply_reports(&self, snapshot: &NeighborSnapshot) {
        let mut engine = self.engine.lock().await;
        for report in snapshot.iter() {
            engine.observe(report.node_id, report.value, report.enabled);
        }
    }

    async fn emit_telemetry(&self) {
        let snapshot = {
            let engine = self.engine.lock().await;
            if engine.lifecycle() != Lifecycle::Running {
                return;
            }
            engine.snapshot(engine_now())
        };
        self.sink.emit(&encode_telemetry(&snapshot));
    }
}
