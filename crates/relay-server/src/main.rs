//! Chat relay: entry point.
//!
//! Accepts WebSocket connections on a single path and re-broadcasts every text
//! message a client sends, as `"<connection-id> says <text>"`, to every
//! connected client (the sender included).
//!
//! # Usage
//!
//! ```text
//! chat-relay [OPTIONS]
//!
//! Options:
//!   --bind <ADDR>                 Listener IP address [default: 0.0.0.0]
//!   --port <PORT>                 Listener port [default: 5000]
//!   --path <PATH>                 WebSocket endpoint path [default: /chat]
//!   --send-timeout-ms <MS>        Per-recipient send timeout [default: 5000]
//!   --max-message-size <BYTES>    Largest accepted message [default: 1048576]
//!   --handshake-timeout-ms <MS>   Time allowed for the HTTP request head [default: 10000]
//!   --config <FILE>               Optional TOML config file
//! ```
//!
//! # Precedence
//!
//! CLI flag, then environment variable, then config file, then built-in
//! default.
//!
//! | Variable                          | Config key                    |
//! |-----------------------------------|-------------------------------|
//! | `CHAT_RELAY_BIND`                 | `server.bind_address`         |
//! | `CHAT_RELAY_PORT`                 | `server.port`                 |
//! | `CHAT_RELAY_PATH`                 | `server.path`                 |
//! | `CHAT_RELAY_SEND_TIMEOUT_MS`      | `limits.send_timeout_ms`      |
//! | `CHAT_RELAY_MAX_MESSAGE_SIZE`     | `limits.max_message_size`     |
//! | `CHAT_RELAY_HANDSHAKE_TIMEOUT_MS` | `limits.handshake_timeout_ms` |
//! | `CHAT_RELAY_CONFIG`               | n/a                           |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_server::domain::RelayConfig;
use relay_server::infrastructure::{run_server, ConfigFile};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket broadcast relay.
///
/// Every field is optional so that an unset flag can fall through to the
/// config file and then to the built-in default.
#[derive(Debug, Default, Parser)]
#[command(
    name = "chat-relay",
    about = "WebSocket relay that re-broadcasts every text message to every client",
    version
)]
struct Cli {
    /// IP address to bind the listener to.
    ///
    /// `0.0.0.0` accepts connections on every interface; `127.0.0.1` only
    /// from this machine.
    #[arg(long, env = "CHAT_RELAY_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "CHAT_RELAY_PORT")]
    port: Option<u16>,

    /// The only path upgraded to a WebSocket.
    #[arg(long, env = "CHAT_RELAY_PATH")]
    path: Option<String>,

    /// Upper bound on one send to one recipient, in milliseconds.
    #[arg(long, env = "CHAT_RELAY_SEND_TIMEOUT_MS")]
    send_timeout_ms: Option<u64>,

    /// Largest accepted (reassembled) message, in bytes.
    #[arg(long, env = "CHAT_RELAY_MAX_MESSAGE_SIZE")]
    max_message_size: Option<usize>,

    /// Time a new connection gets to send its HTTP request head, in milliseconds.
    #[arg(long, env = "CHAT_RELAY_HANDSHAKE_TIMEOUT_MS")]
    handshake_timeout_ms: Option<u64>,

    /// Optional TOML config file.
    #[arg(long, env = "CHAT_RELAY_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Loads the config file named by `--config`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    fn load_config_file(&self) -> anyhow::Result<ConfigFile> {
        match &self.config {
            Some(path) => ConfigFile::load(path)
                .with_context(|| format!("failed to load config file {}", path.display())),
            None => Ok(ConfigFile::default()),
        }
    }

    /// Merges CLI/env values over `file` over the defaults into a validated
    /// [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address is not an IP address, or if the
    /// merged configuration fails validation.
    fn into_relay_config(self, file: ConfigFile) -> anyhow::Result<RelayConfig> {
        let defaults = RelayConfig::default();

        let bind = self.bind.or(file.server.bind_address);
        let ip: IpAddr = match bind {
            Some(text) => text
                .parse()
                .with_context(|| format!("invalid bind address: '{text}'"))?,
            None => defaults.bind_addr.ip(),
        };
        let port = self
            .port
            .or(file.server.port)
            .unwrap_or(defaults.bind_addr.port());

        let config = RelayConfig {
            bind_addr: SocketAddr::new(ip, port),
            path: self
                .path
                .or(file.server.path)
                .unwrap_or(defaults.path),
            send_timeout: self
                .send_timeout_ms
                .or(file.limits.send_timeout_ms)
                .map_or(defaults.send_timeout, Duration::from_millis),
            max_message_size: self
                .max_message_size
                .or(file.limits.max_message_size)
                .unwrap_or(defaults.max_message_size),
            handshake_timeout: self
                .handshake_timeout_ms
                .or(file.limits.handshake_timeout_ms)
                .map_or(defaults.handshake_timeout, Duration::from_millis),
        };

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised; the level comes from `RUST_LOG`
///    (falling back to `info`).
/// 2. CLI arguments and environment variables are parsed with `clap`.
/// 3. The optional config file is loaded and merged into a [`RelayConfig`].
/// 4. A Ctrl+C handler is spawned; it clears a shared `AtomicBool`.
/// 5. [`run_server`] accepts connections until the flag is cleared, then
///    closes the remaining sessions with `1001 going away`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let cli = Cli::parse();
    let file = cli.load_config_file()?;
    let config = cli.into_relay_config(file)?;

    info!(
        "chat relay starting: bind={}, path={}, send_timeout={:?}, max_message_size={}",
        config.bind_addr, config.path, config.send_timeout, config.max_message_size
    );

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Main server loop ───────────────────────────────────────────────────────
    run_server(config, running).await?;

    info!("chat relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
