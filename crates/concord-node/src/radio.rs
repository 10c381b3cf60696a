//! Collaborators at the edge of the node: broadcast radio and telemetry sink.
//!
//! The schedulers only see the two traits. [`UdpRadio`] stands in for the
//! short-range radio with UDP broadcast on a LAN; the memory variants back
//! tests and dry runs.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use concord_protocols::{Advertisement, PAYLOAD_LEN};
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::inbox::NeighborInbox;

/// Outbound broadcast.
pub trait Radio: Send + Sync {
    /// Replace the advertised payload. Must not block.
    fn advertise(&self, ad: Advertisement);
}

/// Outbound telemetry lines.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, line: &str);
}

/// UDP stand-in for the broadcast radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Local address to bind
    pub bind: SocketAddr,
    /// Broadcast destination
    pub broadcast: SocketAddr,
    /// Advertising interval in milliseconds
    pub advertise_interval_ms: u64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 47_000)),
            broadcast: SocketAddr::from(([255, 255, 255, 255], 47_000)),
            advertise_interval_ms: 100,
        }
    }
}

impl RadioConfig {
    pub fn advertise_interval(&self) -> Duration {
        Duration::from_millis(self.advertise_interval_ms)
    }
}

/// UDP broadcast radio.
///
/// [`Radio::advertise`] only swaps the payload; a background task sends the
/// current payload once per advertising interval.
pub struct UdpRadio {
    socket: Arc<UdpSocket>,
    payload: watch::Sender<Option<Bytes>>,
    config: RadioConfig,
}

impl UdpRadio {
    /// Bind a broadcast-capable socket. Needs a running tokio runtime.
    pub fn bind(config: RadioConfig) -> Result<Self> {
        let domain = if config.bind.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.bind(&config.bind.into())?;
        socket.set_nonblocking(true)?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;
        info!(
            "UDP radio bound to {} (broadcast {}, every {} ms)",
            config.bind, config.broadcast, config.advertise_interval_ms
        );

        let (payload, _) = watch::channel(None);
        Ok(Self {
            socket: Arc::new(socket),
            payload,
            config,
        })
    }

    /// Local address, useful when bound to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Start the advertiser and receiver tasks.
    pub fn spawn(
        &self,
        inbox: Arc<NeighborInbox>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>> {
        if self.config.advertise_interval_ms == 0 {
            return Err(Error::Radio("advertising interval must be greater than zero".into()));
        }
        let advertiser = tokio::spawn(advertise_loop(
            Arc::clone(&self.socket),
            self.payload.subscribe(),
            self.config.broadcast,
            self.config.advertise_interval(),
            shutdown.clone(),
        ));
        let receiver = tokio::spawn(receive_loop(Arc::clone(&self.socket), inbox, shutdown));
        Ok(vec![advertiser, receiver])
    }
}

impl Radio for UdpRadio {
    fn advertise(&self, ad: Advertisement) {
        self.payload.send_replace(Some(ad.encode()));
    }
}

async fn advertise_loop(
    socket: Arc<UdpSocket>,
    payload: watch::Receiver<Option<Bytes>>,
    broadcast: SocketAddr,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        let current = payload.borrow().clone();
        if let Some(data) = current {
            if let Err(e) = socket.send_to(&data, broadcast).await {
                warn!("Advertisement to {} failed: {}", broadcast, e);
            }
        }
    }
    debug!("Advertiser stopped");
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    inbox: Arc<NeighborInbox>,
    mut shutdown: watch::Receiver<bool>,
) {
    // Room for an oversized datagram so it is rejected rather than truncated.
    let mut buf = [0u8; PAYLOAD_LEN * 8];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, from)) => match Advertisement::decode(&buf[..len]) {
                    Ok(ad) => {
                        trace!(
                            node_id = ad.node_id,
                            value = ad.value,
                            %from,
                            "Advertisement received"
                        );
                        inbox.deliver(ad.into());
                    }
                    Err(e) => trace!(%from, error = %e, "Dropped datagram"),
                },
                Err(e) => warn!("Radio receive failed: {}", e),
            },
            _ = shutdown.changed() => break,
        }
    }
    debug!("Receiver stopped");
}

/// Radio that records what it was asked to advertise.
#[derive(Debug, Default)]
pub struct MemoryRadio {
    last: Mutex<Option<Advertisement>>,
    count: AtomicU64,
}

impl MemoryRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent advertisement.
    pub fn last(&self) -> Option<Advertisement> {
        *self.last.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Number of payload updates.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Radio for MemoryRadio {
    fn advertise(&self, ad: Advertisement) {
        *self.last.lock().unwrap_or_else(|p| p.into_inner()) = Some(ad);
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Sink that keeps every line.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(line.to_string());
    }
}

/// Sink writing to standard output, the serial link of a hosted node.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl TelemetrySink for StdoutSink {
    fn emit(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(line.as_bytes()).and_then(|()| out.flush()) {
            warn!("Telemetry write failed: {}", e);
        }
    }
}
