//! Errors raised by the pure protocol helpers.

use thiserror::Error;

/// Errors that can occur while reassembling, decoding, or parsing relay
/// protocol data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A logical message grew past the configured size cap while its
    /// fragments were being accumulated.
    #[error("message too large: {attempted} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { limit: usize, attempted: usize },

    /// A text payload was not valid UTF-8.
    #[error("invalid UTF-8 in text payload at byte {valid_up_to}")]
    InvalidUtf8 { valid_up_to: usize },

    /// A close-frame payload did not follow the RFC 6455 layout.
    #[error("malformed close payload: {0}")]
    MalformedClosePayload(String),
}
