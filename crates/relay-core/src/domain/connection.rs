//! Connection identity.
//!
//! Every WebSocket connection accepted by the relay is registered under a
//! [`ConnectionId`].  The same identifier doubles as the sender tag on every
//! message the connection broadcasts, so its [`Display`](std::fmt::Display)
//! form is part of the wire format: the canonical hyphenated lowercase UUID
//! (`8-4-4-4-12` hex digits).

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Opaque, process-unique identifier of one relay connection.
///
/// Backed by a random (v4) UUID.  122 random bits make an accidental collision
/// between two live connections practically impossible, which is what allows
/// the registry to treat a duplicate insert as a programming error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh random identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `Uuid`'s Display is already the hyphenated lowercase form.
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for ConnectionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
