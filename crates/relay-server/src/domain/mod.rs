//! Domain layer for relay-server.
//!
//! The domain layer contains plain configuration types with no dependencies
//! on I/O, networking, or external frameworks.
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;

pub use config::{ConfigValidationError, RelayConfig};
