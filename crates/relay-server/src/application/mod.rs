//! Application layer for relay-server.
//!
//! The application layer orchestrates the relay's behaviour: it knows *what*
//! to do with each connection, but delegates *how* bytes move to the
//! infrastructure layer through the transport ports.
//!
//! # Responsibilities
//!
//! - Tracking live connections ([`ConnectionRegistry`])
//! - Running one session loop per connection ([`Session`])
//! - Fanning text messages out to every registered peer ([`broadcast()`])
//! - Declaring the transport ports ([`FrameSource`], [`PeerSink`])
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections (that is infrastructure)
//! - HTTP routing and upgrades (axum, hyper) and WebSocket framing
//!   (tokio-tungstenite)

pub mod broadcast;
pub mod registry;
pub mod session;
pub mod transport;

pub use broadcast::{broadcast, BroadcastError, BroadcastReport};
pub use registry::{ConnectionRegistry, Peer};
pub use session::{Session, SessionOutcome, SessionSettings, SessionState};
pub use transport::{FrameSource, PeerSink, TransportError};
