//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections.
//! 3. Serving each connection as HTTP/1.1 with hyper, bounded by the
//!    handshake timeout for the request head, and routing every request
//!    through [`router`](crate::infrastructure::routes::router).
//! 4. Running one [`Session`] per upgraded connection in its own Tokio task,
//!    all of them sharing one [`ConnectionRegistry`].
//! 5. Stopping when the `running` flag is cleared, and telling every live
//!    session that the server is going away (close code 1001).
//!
//! # Scalability
//!
//! The accept loop never blocks on a connection: it accepts, spawns, and goes
//! straight back to `accept()`.  A slow request or a slow peer only ever
//! occupies its own task.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use axum::extract::ConnectInfo;
use axum::Router;
use futures_util::future::join_all;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_tungstenite::WebSocketStream;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

use relay_core::{CloseStatus, ConnectionId};

use crate::application::registry::{ConnectionRegistry, Peer};
use crate::application::session::{Session, SessionOutcome, SessionSettings};
use crate::application::transport::PeerSink;
use crate::domain::config::RelayConfig;
use crate::infrastructure::routes::{router, RelayState};
use crate::infrastructure::ws_transport::split_stream;

/// How often the accept loop re-checks the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// How often shutdown re-checks the registry while it drains.
const DRAIN_POLL: Duration = Duration::from_millis(10);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(config: RelayConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;

    serve(listener, config, Arc::new(ConnectionRegistry::new()), running).await
}

/// Runs the accept loop on an already-bound listener.
///
/// `registry` is shared by every session accepted here.  Passing it in (rather
/// than creating it inside) lets callers observe which connections are live.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn serve(
    listener: TcpListener,
    config: RelayConfig,
    registry: Arc<ConnectionRegistry>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let local_addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!("chat relay listening on ws://{local_addr}{}", config.path);

    let grace = config.send_timeout;
    let state = RelayState {
        config: Arc::new(config),
        registry: Arc::clone(&registry),
        running: Arc::clone(&running),
    };
    let app = router(state.clone());

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Bounded so the loop sees the `running` flag even when idle.
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new connection from {peer_addr}");
                let app = app.clone();
                let handshake_timeout = state.config.handshake_timeout;
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, app, handshake_timeout).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. too many open file descriptors); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    drop(listener);
    close_all(&registry, grace).await;
    Ok(())
}

/// Sends `1001 going away` to every live session and waits (bounded by
/// `grace`) for them to deregister.
///
/// The registry is re-read while waiting, so a session whose upgrade was
/// still in flight when shutdown began is closed as soon as it registers.
pub async fn close_all(registry: &ConnectionRegistry, grace: Duration) {
    let deadline = Instant::now() + grace;
    let mut told: HashSet<ConnectionId> = HashSet::new();

    loop {
        let pending: Vec<Peer> = registry
            .snapshot()
            .await
            .into_iter()
            .filter(|peer| !told.contains(&peer.id()))
            .collect();

        if !pending.is_empty() {
            info!("closing {} live session(s)", pending.len());
            told.extend(pending.iter().map(Peer::id));
            join_all(pending.iter().map(|peer| async move {
                match timeout_at(deadline, peer.sink().close(Some(going_away()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!("close to {} not sent: {e}", peer.id()),
                    Err(_) => debug!("close to {} timed out", peer.id()),
                }
                peer.evict();
            }))
            .await;
        }

        if registry.is_empty().await || Instant::now() >= deadline {
            break;
        }
        sleep(DRAIN_POLL).await;
    }
}

fn going_away() -> CloseStatus {
    CloseStatus::new(CloseStatus::GOING_AWAY, "server shutting down")
}

// ── Per-connection handlers ───────────────────────────────────────────────────

/// Serves HTTP/1.1 on one accepted TCP connection until it closes or is
/// upgraded.
///
/// The peer address travels with every request as [`ConnectInfo`].
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    app: Router,
    handshake_timeout: Duration,
) {
    let service = service_fn(move |mut request: hyper::Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer_addr));
        app.clone().oneshot(request)
    });

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(handshake_timeout);

    if let Err(e) = builder
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades()
        .await
    {
        debug!("{peer_addr}: HTTP connection ended: {e}");
    }
}

/// Top-level handler for one upgraded connection.
///
/// Wraps [`run_upgrade`] and logs the outcome.
pub(crate) async fn handle_upgrade(on_upgrade: OnUpgrade, peer_addr: SocketAddr, state: RelayState) {
    match run_upgrade(on_upgrade, peer_addr, state).await {
        Ok(Some(SessionOutcome::Disconnected(e))) => {
            info!("{peer_addr}: disconnected ({e})");
        }
        Ok(Some(outcome)) => info!("{peer_addr}: session ended ({outcome:?})"),
        Ok(None) => debug!("{peer_addr}: upgraded during shutdown; sent 1001"),
        Err(e) => warn!("{peer_addr}: connection failed: {e:#}"),
    }
}

/// Completes the upgrade and serves the session.
///
/// Returns `Ok(None)` if the server began shutting down before the upgrade
/// finished; the connection is then closed with 1001 instead.
///
/// # Errors
///
/// Returns an error if hyper cannot hand over the upgraded connection in
/// time.
async fn run_upgrade(
    on_upgrade: OnUpgrade,
    peer_addr: SocketAddr,
    state: RelayState,
) -> anyhow::Result<Option<SessionOutcome>> {
    let upgraded = timeout(state.config.handshake_timeout, on_upgrade)
        .await
        .with_context(|| format!("upgrade of {peer_addr} timed out"))?
        .with_context(|| format!("upgrade of {peer_addr} failed"))?;

    let ws_stream = WebSocketStream::from_raw_socket(
        TokioIo::new(upgraded),
        Role::Server,
        Some(websocket_config(&state.config)),
    )
    .await;
    let (source, sink) = split_stream(ws_stream);

    if !state.running.load(Ordering::Relaxed) {
        if let Err(e) = sink.close(Some(going_away())).await {
            debug!("{peer_addr}: close frame not sent: {e}");
        }
        return Ok(None);
    }

    let session = Session::new(
        source,
        Arc::new(sink),
        state.registry,
        SessionSettings::from(state.config.as_ref()),
    );
    info!("{peer_addr}: WebSocket session {} established", session.id());

    Ok(Some(session.run().await))
}

/// tungstenite limits matching the relay's own message cap.
fn websocket_config(config: &RelayConfig) -> WebSocketConfig {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_size);
    ws_config.max_frame_size = Some(config.max_message_size);
    ws_config
}

// ── Tests ─────────────────────────────────────────────────────────────────────
