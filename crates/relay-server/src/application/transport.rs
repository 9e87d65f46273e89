//! Transport ports.
//!
//! A connection handle is a duplex channel, but the relay uses its two
//! directions very differently:
//!
//! - The **receive** side is read by exactly one task, the connection's own
//!   session loop.  It is modelled by [`FrameSource`], owned (`&mut self`) by
//!   the [`Session`](crate::application::Session).
//! - The **send** side is written by every task that broadcasts, concurrently.
//!   It is modelled by [`PeerSink`], taking `&self` and shared as
//!   `Arc<dyn PeerSink>` through the registry.
//!
//! The production implementations wrap the two halves of a tungstenite
//! stream (see `infrastructure::ws_transport`); tests use the scripted
//! doubles in `infrastructure::mock` or the `mockall`-generated
//! `MockPeerSink`.

use async_trait::async_trait;
use thiserror::Error;

use relay_core::{CloseStatus, Frame};

/// Errors reported by a transport adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection is closed or the stream ended.
    #[error("connection closed")]
    Closed,

    /// The transport refused a message larger than its configured cap.
    #[error("message too large: {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    /// The transport refused a text message whose payload is not UTF-8.
    #[error("text message is not valid UTF-8")]
    InvalidPayload,

    /// Any other I/O or protocol failure, rendered as text.
    #[error("transport error: {0}")]
    Io(String),
}

/// The receive side of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Waits for the next physical frame.
    ///
    /// Returns `Ok(None)` when the peer went away without a close frame
    /// (end of stream).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the read fails.  The caller must treat
    /// any error as the end of the connection.
    async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError>;
}

/// The send side of a connection, safe to call from many tasks at once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PeerSink: Send + Sync {
    /// Sends one complete text message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the message could not be written.
    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Sends a close frame carrying `status` (or no status).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the close frame could not be written.
    async fn close(&self, status: Option<CloseStatus>) -> Result<(), TransportError>;
}
