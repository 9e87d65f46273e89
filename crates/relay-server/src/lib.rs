//! relay-server library crate.
//!
//! This crate provides a WebSocket broadcast relay: every text message a
//! client sends is re-sent, tagged with the sender's connection identifier, to
//! every client currently connected (the sender included).
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! WebSocket clients (plain UTF-8 text frames)
//!         ↕
//! [relay-server]
//!   ├── domain/           Pure types: RelayConfig
//!   ├── application/      Registry, session loop, broadcast, transport ports
//!   └── infrastructure/
//!         ├── ws_server/     Accept loop, hyper connections, upgraded sessions
//!         ├── routes/        axum router: endpoint upgrade, 400/404 responses
//!         ├── ws_transport/  tungstenite adapters for the transport ports
//!         ├── config_file/   TOML config file loader
//!         └── mock/          Scripted transport doubles for tests
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies (no I/O, no async, no frameworks).
//! - `application` depends on `domain`, `relay-core` and tokio's sync/time
//!   primitives only; it talks to connections through the
//!   [`application::FrameSource`] and [`application::PeerSink`] traits.
//! - `infrastructure` depends on all other layers plus `tokio::net`, `axum`,
//!   `hyper` and `tungstenite`.
//!
//! Keeping the session loop behind two small traits means every lifecycle
//! rule (registration, close echo, eviction, fragment reassembly) is unit
//! tested without opening a socket.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: registry, session loop and broadcast fan-out.
pub mod application;

/// Infrastructure layer: WebSocket server, transport adapters, config file.
pub mod infrastructure;
