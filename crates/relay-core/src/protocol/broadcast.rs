//! The broadcast text format.
//!
//! Every text message a client sends is re-sent to every connected client as
//! ```text
//! <sender-connection-id> says <original text>
//! ```
//! with the identifier in its canonical hyphenated form.  There is no JSON
//! envelope and no extra framing; the WebSocket message boundary is the only
//! delimiter.

use crate::domain::connection::ConnectionId;
use crate::protocol::error::ProtocolError;

/// Decodes a text payload as UTF-8.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidUtf8`] if `payload` is not valid UTF-8.
pub fn decode_text(payload: &[u8]) -> Result<&str, ProtocolError> {
    std::str::from_utf8(payload).map_err(|e| ProtocolError::InvalidUtf8 {
        valid_up_to: e.valid_up_to(),
    })
}

/// Builds the line delivered to every recipient of a broadcast.
///
/// # Examples
///
/// ```rust
/// use relay_core::{format_broadcast, ConnectionId};
///
/// let sender: ConnectionId = "6f9619ff-8b86-d011-b42d-00c04fc964ff".parse().unwrap();
/// assert_eq!(
///     format_broadcast(sender, "hi"),
///     "6f9619ff-8b86-d011-b42d-00c04fc964ff says hi"
/// );
/// ```
pub fn format_broadcast(sender: ConnectionId, text: &str) -> String {
    format!("{sender} says {text}")
}
