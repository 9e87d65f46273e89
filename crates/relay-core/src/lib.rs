//! # relay-core
//!
//! Shared library for the chat relay containing connection identity, the
//! frame model and its reassembly logic, the RFC 6455 close payload codec, and
//! the broadcast text format.
//!
//! This crate is used by the server crate and by its tests and benchmarks.
//! It has zero dependencies on async runtimes, network sockets, or WebSocket
//! libraries.
//!
//! # Architecture overview
//!
//! The relay accepts WebSocket clients and re-sends every text message it
//! receives to every connected client, tagged with the sender's identifier.
//! This crate holds the parts of that job that are pure data manipulation:
//!
//! - **`domain`** – Who is talking.  [`ConnectionId`] is the opaque token a
//!   connection is registered under and the tag its messages carry.
//!
//! - **`protocol`** – What travels over the wire.  A logical message may be
//!   split into several physical [`Frame`]s; the [`FrameAccumulator`] glues
//!   them back together, enforcing a size cap.  [`CloseStatus`] encodes and
//!   decodes close-frame payloads, and [`format_broadcast`] produces the
//!   `"<id> says <text>"` line every recipient sees.

pub mod domain;
pub mod protocol;

pub use domain::connection::ConnectionId;
pub use protocol::accumulator::{AssembledMessage, FrameAccumulator, DEFAULT_MAX_MESSAGE_SIZE};
pub use protocol::broadcast::{decode_text, format_broadcast};
pub use protocol::close::CloseStatus;
pub use protocol::error::ProtocolError;
pub use protocol::frame::{Frame, MessageKind};
