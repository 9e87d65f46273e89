//! Infrastructure layer: sockets, HTTP, tungstenite, files.
//!
//! - [`ws_server`]: accept loop and per-connection tasks.
//! - [`routes`]: axum router for the endpoint, `400` and `404`.
//! - [`ws_transport`]: tungstenite adapters for the transport ports.
//! - [`config_file`]: optional TOML configuration file.
//! - [`mock`]: scripted transport doubles for tests.

pub mod config_file;
pub mod mock;
pub mod routes;
pub mod ws_server;
pub mod ws_transport;

pub use config_file::{ConfigError, ConfigFile};
pub use ws_server::{run_server, serve};
