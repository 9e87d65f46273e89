//! Domain entities shared by every layer of the relay.

pub mod connection;

pub use connection::ConnectionId;
