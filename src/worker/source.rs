//! Reading events from a JSON Lines stream.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::types::Event;

/// Errors from an event source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read event stream: {0}")]
    Io(#[from] io::Error),

    /// The dispatch loop dropped its receiver.
    #[error("dispatch loop is no longer accepting events")]
    Closed,
}

/// Counters from one run of [`forward_events`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ForwardStats {
    pub forwarded: u64,

    /// Lines that did not decode as an event.
    pub skipped: u64,
}

/// Forwards one event per line of `reader` into `tx` until end of input or
/// `shutdown`.
///
/// Blank lines are ignored. Lines that do not decode, including lines that
/// are not UTF-8, are logged and skipped. When the channel is full this
/// waits, so a slow dispatch loop slows the reader down.
pub async fn forward_events<R>(
    mut reader: R,
    tx: mpsc::Sender<Event>,
    shutdown: CancellationToken,
) -> Result<ForwardStats, SourceError>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ForwardStats::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read?,
        };
        if read == 0 {
            debug!("End of event stream");
            break;
        }

        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }

        let event: Event = match serde_json::from_slice(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Skipping undecodable event");
                stats.skipped += 1;
                continue;
            }
        };
        trace!(event_type = %event.kind, "Forwarding event");

        tokio::select! {
            _ = shutdown.cancelled() => break,
            sent = tx.send(event) => {
                if sent.is_err() {
                    return Err(SourceError::Closed);
                }
                stats.forwarded += 1;
            }
        }
    }

    Ok(stats)
}
