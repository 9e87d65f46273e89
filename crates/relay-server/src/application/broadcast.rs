//! The broadcast routine: one text message in, one send per registered peer out.
//!
//! ```text
//! payload ──decode UTF-8──► text ──format──► "<sender> says <text>"
//!                                                   │
//!              registry.snapshot() ──► [peer A, peer B, peer C, ...]
//!                                                   │
//!                   join_all( timeout(send_timeout, peer.send_text(line)) )
//! ```
//!
//! # Failure isolation
//!
//! Sends run concurrently and each is bounded by `send_timeout`, so a slow or
//! dead recipient costs the broadcast at most one timeout and never blocks
//! delivery to the others.  A recipient whose send fails or times out is
//! evicted: its session is woken and deregisters itself.
//!
//! The sender is part of the snapshot like any other peer and receives its
//! own line.

use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use relay_core::{decode_text, format_broadcast, ConnectionId, ProtocolError};

use crate::application::registry::ConnectionRegistry;

/// Why a payload could not be broadcast at all.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BroadcastError {
    /// The text payload was not valid UTF-8; nothing was sent.
    #[error("cannot broadcast payload: {0}")]
    Decode(#[from] ProtocolError),
}

/// What happened during one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Number of peers in the snapshot.
    pub recipients: usize,
    /// Number of peers the line was delivered to.
    pub delivered: usize,
    /// Peers whose send failed or timed out (and were evicted).
    pub failed: Vec<ConnectionId>,
}

/// Sends `"<sender> says <payload>"` to every peer registered right now.
///
/// All sends are attempted before this returns.  Individual send failures are
/// logged, recorded in the report, and turned into evictions; they are never
/// returned as an error.
///
/// # Errors
///
/// Returns [`BroadcastError::Decode`] if `payload` is not valid UTF-8.  In that
/// case no peer is contacted.
pub async fn broadcast(
    registry: &ConnectionRegistry,
    sender: ConnectionId,
    payload: &[u8],
    send_timeout: Duration,
) -> Result<BroadcastReport, BroadcastError> {
    let text = decode_text(payload)?;
    let line = format_broadcast(sender, text);

    let peers = registry.snapshot().await;

    let sends = peers.iter().map(|peer| {
        let line = line.clone();
        async move {
            let result = match timeout(send_timeout, peer.sink().send_text(line)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("timed out after {send_timeout:?}")),
            };
            (peer, result)
        }
    });

    let mut report = BroadcastReport {
        recipients: peers.len(),
        ..BroadcastReport::default()
    };

    for (peer, result) in join_all(sends).await {
        match result {
            Ok(()) => report.delivered += 1,
            Err(reason) => {
                warn!(
                    "broadcast from {sender}: send to {} failed ({reason}); evicting",
                    peer.id()
                );
                peer.evict();
                report.failed.push(peer.id());
            }
        }
    }

    debug!(
        "broadcast from {sender}: delivered to {}/{} peer(s)",
        report.delivered, report.recipients
    );

    Ok(report)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
