//! Serial command reader.
//!
//! Bytes from the link are framed into lines and each line is dispatched to
//! the engine under its lock. A bad line is logged and dropped; the reader
//! keeps going.

use concord_protocols::{dispatch, LineFramer};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::Result;
use crate::scheduler::{engine_now, SharedEngine};

/// Read commands until EOF or shutdown. Returns the number of applied commands.
pub async fn run_serial<R>(
    mut reader: R,
    engine: SharedEngine,
    mut shutdown: watch::Receiver<bool>,
) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut framer = LineFramer::new();
    let mut buf = [0u8; 256];
    let mut applied = 0;

    loop {
        let n = tokio::select! {
            read = reader.read(&mut buf) => read?,
            _ = shutdown.changed() => break,
        };
        if n == 0 {
            debug!(pending = framer.pending(), "Serial input closed");
            break;
        }
        for line in framer.push(&buf[..n]) {
            let mut engine = engine.lock().await;
            if dispatch(&line, &mut engine, engine_now()).is_ok() {
                applied += 1;
            }
        }
    }

    info!(applied, "Serial reader stopped");
    Ok(applied)
}
