//! The per-connection session loop.
//!
//! One [`Session`] runs for each accepted connection, in its own Tokio task.
//!
//! # State machine
//!
//! ```text
//!   Connecting ──register──► Open ──close / oversize / bad UTF-8──► Closing ──► Closed
//!                             │  ▲                                          ▲
//!                             │  └── text: broadcast, binary: ignore        │
//!                             └──── read error / end of stream / evicted ───┘
//! ```
//!
//! - **Connecting → Open**: the session registers its [`ConnectionId`] with the
//!   [`ConnectionRegistry`].
//! - **Open**: reads one *logical* message at a time, reassembling fragments
//!   with a [`FrameAccumulator`].  Text is broadcast; binary is ignored.
//! - **Closing**: entered on a peer close frame (the peer's code and reason are
//!   echoed back untouched), on an oversized message (closed with 1009), or
//!   on a text message the transport rejected as non-UTF-8 (closed with 1007).
//! - **Closed**: the receive side is dropped and the registry entry removed.
//!   Read failures and evictions jump straight here without sending anything.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use relay_core::{
    AssembledMessage, CloseStatus, ConnectionId, FrameAccumulator, MessageKind, ProtocolError,
};

use crate::application::broadcast::broadcast;
use crate::application::registry::{ConnectionRegistry, Peer};
use crate::application::transport::{FrameSource, PeerSink, TransportError};
use crate::domain::config::RelayConfig;

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl SessionState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Open) | (Open, Closing) | (Open, Closed) | (Closing, Closed)
        )
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The peer sent a close frame; its status (if any) was echoed back.
    ClosedByPeer(Option<CloseStatus>),
    /// The read side failed or ended without a close frame.
    Disconnected(TransportError),
    /// The peer sent a message larger than the cap; closed with 1009.
    MessageTooLarge,
    /// The transport rejected a text message as non-UTF-8; closed with 1007.
    InvalidPayload,
    /// A broadcast could not deliver to this peer and evicted it.
    Evicted,
}

/// Per-session tunables, derived from [`RelayConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub send_timeout: Duration,
    pub max_message_size: usize,
}

impl From<&RelayConfig> for SessionSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            send_timeout: config.send_timeout,
            max_message_size: config.max_message_size,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

/// Why reading the next logical message stopped.
enum ReadFailure {
    Transport(TransportError),
    TooLarge,
    InvalidPayload,
}

/// One connection's session loop.
pub struct Session<S> {
    id: ConnectionId,
    source: S,
    sink: Arc<dyn PeerSink>,
    registry: Arc<ConnectionRegistry>,
    settings: SessionSettings,
    state: SessionState,
}

impl<S: FrameSource> Session<S> {
    /// Prepares a session for a connection whose handshake just completed.
    ///
    /// The connection identifier is generated here; the session does not
    /// appear in the registry until [`run`](Self::run) is called.
    pub fn new(
        source: S,
        sink: Arc<dyn PeerSink>,
        registry: Arc<ConnectionRegistry>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            id: ConnectionId::new_random(),
            source,
            sink,
            registry,
            settings,
            state: SessionState::Connecting,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session to completion.
    ///
    /// Registers the connection, serves it until it closes, fails, or is
    /// evicted, then deregisters it.  The registry never holds this
    /// connection after `run` returns.
    pub async fn run(mut self) -> SessionOutcome {
        let peer = Peer::new(self.id, Arc::clone(&self.sink));
        self.registry.add(peer.clone()).await;
        self.advance(SessionState::Open);
        let registered = self.registry.len().await;
        info!("session {}: open ({registered} connection(s) registered)", self.id);

        let outcome = self.serve(&peer).await;

        self.advance(SessionState::Closed);
        let Session {
            id,
            source,
            registry,
            ..
        } = self;
        // Release the receive side before the entry disappears.
        drop(source);
        registry.remove(id).await;
        info!("session {id}: closed ({outcome:?})");
        outcome
    }

    /// The `Open` state: read, dispatch, repeat.
    async fn serve(&mut self, peer: &Peer) -> SessionOutcome {
        let mut accumulator = FrameAccumulator::new(self.settings.max_message_size);

        loop {
            let next = tokio::select! {
                biased;
                _ = peer.evicted() => {
                    debug!("session {}: evicted", self.id);
                    return SessionOutcome::Evicted;
                }
                next = read_message(&mut self.source, &mut accumulator) => next,
            };

            match next {
                Ok(message) => {
                    if let Some(outcome) = self.dispatch(message).await {
                        return outcome;
                    }
                }
                Err(ReadFailure::TooLarge) => {
                    self.advance(SessionState::Closing);
                    warn!(
                        "session {}: message exceeds {} bytes; closing",
                        self.id, self.settings.max_message_size
                    );
                    self.send_close(Some(CloseStatus::message_too_big())).await;
                    return SessionOutcome::MessageTooLarge;
                }
                Err(ReadFailure::InvalidPayload) => {
                    self.advance(SessionState::Closing);
                    warn!("session {}: text message is not valid UTF-8; closing", self.id);
                    self.send_close(Some(CloseStatus::invalid_payload())).await;
                    return SessionOutcome::InvalidPayload;
                }
                Err(ReadFailure::Transport(error)) => {
                    debug!("session {}: read failed: {error}", self.id);
                    return SessionOutcome::Disconnected(error);
                }
            }
        }
    }

    /// Acts on one complete message.  Returns `Some` when the session must end.
    async fn dispatch(&mut self, message: AssembledMessage) -> Option<SessionOutcome> {
        match message.kind {
            MessageKind::Text => {
                if message.fragments > 1 {
                    debug!(
                        "session {}: text reassembled from {} fragments",
                        self.id, message.fragments
                    );
                }
                if let Err(e) = broadcast(
                    &self.registry,
                    self.id,
                    &message.payload,
                    self.settings.send_timeout,
                )
                .await
                {
                    warn!("session {}: {e}; message dropped", self.id);
                }
                None
            }
            MessageKind::Binary => {
                debug!(
                    "session {}: ignoring binary message ({} bytes)",
                    self.id,
                    message.payload.len()
                );
                None
            }
            MessageKind::Close => {
                self.advance(SessionState::Closing);
                let status = match CloseStatus::decode(&message.payload) {
                    Ok(status) => status,
                    Err(e) => {
                        warn!("session {}: {e}; acknowledging without status", self.id);
                        None
                    }
                };
                debug!(
                    "session {}: peer closed with {}",
                    self.id,
                    status
                        .as_ref()
                        .map_or_else(|| "no status".to_string(), ToString::to_string)
                );
                self.send_close(status.clone()).await;
                Some(SessionOutcome::ClosedByPeer(status))
            }
        }
    }

    async fn send_close(&self, status: Option<CloseStatus>) {
        if let Err(e) = self.sink.close(status).await {
            debug!("session {}: close frame not sent: {e}", self.id);
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid session transition {:?} -> {next:?}",
            self.state
        );
        debug!("session {}: {:?} -> {next:?}", self.id, self.state);
        self.state = next;
    }
}

/// Reads physical frames until one logical message is complete.
async fn read_message<S: FrameSource>(
    source: &mut S,
    accumulator: &mut FrameAccumulator,
) -> Result<AssembledMessage, ReadFailure> {
    loop {
        let frame = match source.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Err(ReadFailure::Transport(TransportError::Closed)),
            Err(TransportError::MessageTooLarge { .. }) => return Err(ReadFailure::TooLarge),
            Err(TransportError::InvalidPayload) => return Err(ReadFailure::InvalidPayload),
            Err(e) => return Err(ReadFailure::Transport(e)),
        };

        match accumulator.push(frame) {
            Ok(Some(message)) => return Ok(message),
            Ok(None) => continue,
            Err(ProtocolError::MessageTooLarge { .. }) => return Err(ReadFailure::TooLarge),
            Err(e) => return Err(ReadFailure::Transport(TransportError::Io(e.to_string()))),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
