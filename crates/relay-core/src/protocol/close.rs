//! Close-frame payload codec.
//!
//! Wire format (RFC 6455 §5.5.1):
//! ```text
//! [code:2, big-endian][reason: UTF-8, remaining bytes]
//! ```
//! An empty payload means the peer closed without a status.  A one-byte
//! payload is invalid.
//!
//! The relay never interprets the code it receives: when a peer closes, the
//! session echoes the exact code and reason back.  The codec exists so that the
//! transport adapter and the session loop can pass a close status through the
//! transport-neutral [`crate::Frame`] type without losing either part.

use std::fmt;

use crate::protocol::error::ProtocolError;

/// Status code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseStatus {
    pub code: u16,
    pub reason: String,
}

impl CloseStatus {
    /// 1000: normal closure.
    pub const NORMAL: u16 = 1000;
    /// 1001: endpoint going away (server shutdown, browser navigation).
    pub const GOING_AWAY: u16 = 1001;
    /// 1007: payload inconsistent with the message type (non-UTF-8 text).
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// 1009: message too big to process.
    pub const MESSAGE_TOO_BIG: u16 = 1009;

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// The status the relay sends when a peer exceeds the message size cap.
    pub fn message_too_big() -> Self {
        Self::new(Self::MESSAGE_TOO_BIG, "message too large")
    }

    /// The status the relay sends when a text message is not valid UTF-8.
    pub fn invalid_payload() -> Self {
        Self::new(Self::INVALID_PAYLOAD, "text message is not valid UTF-8")
    }

    /// Encodes this status into a close-frame payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + self.reason.len());
        buf.extend_from_slice(&self.code.to_be_bytes());
        buf.extend_from_slice(self.reason.as_bytes());
        buf
    }

    /// Decodes a close-frame payload.
    ///
    /// Returns `Ok(None)` for an empty payload (close without status).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedClosePayload`] if the payload is a
    /// single byte or the reason is not valid UTF-8.
    pub fn decode(payload: &[u8]) -> Result<Option<Self>, ProtocolError> {
        match payload {
            [] => Ok(None),
            [_] => Err(ProtocolError::MalformedClosePayload(
                "payload is 1 byte; a status code needs 2".to_string(),
            )),
            [hi, lo, reason @ ..] => {
                let reason = std::str::from_utf8(reason).map_err(|e| {
                    ProtocolError::MalformedClosePayload(format!("reason is not UTF-8: {e}"))
                })?;
                Ok(Some(Self::new(u16::from_be_bytes([*hi, *lo]), reason)))
            }
        }
    }

    /// Convenience for callers that hold an optional status.
    pub fn encode_optional(status: Option<&CloseStatus>) -> Vec<u8> {
        status.map(CloseStatus::encode).unwrap_or_default()
    }
}

impl fmt::Display for CloseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}
