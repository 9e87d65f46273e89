//! The physical frame model.
//!
//! A WebSocket peer may split one logical message into several frames: the
//! first carries the message type, continuation frames carry more payload, and
//! the last one has its FIN bit set.  [`Frame`] is the transport-neutral view
//! of one such physical frame, as handed to the session loop by whatever
//! transport adapter sits underneath it.

/// The type of a logical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// UTF-8 text.  The only kind the relay rebroadcasts.
    Text,
    /// Opaque binary data.  Ignored by the relay.
    Binary,
    /// Close signal.  The payload, if any, is an RFC 6455 close payload
    /// (see [`crate::CloseStatus`]).
    Close,
}

/// One physical frame received from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type of this frame.  For a fragmented message the type of the
    /// final frame is authoritative.
    pub kind: MessageKind,
    /// Raw payload bytes carried by this frame.
    pub payload: Vec<u8>,
    /// `true` if this is the last frame of its logical message.
    pub is_final: bool,
}

impl Frame {
    /// A complete, single-frame text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            payload: text.into().into_bytes(),
            is_final: true,
        }
    }

    /// A complete, single-frame binary message.
    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: MessageKind::Binary,
            payload: payload.into(),
            is_final: true,
        }
    }

    /// A close frame carrying an already-encoded close payload.
    pub fn close(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: MessageKind::Close,
            payload: payload.into(),
            is_final: true,
        }
    }

    /// A fragment of a larger message.  Set `is_final` on the last one.
    pub fn fragment(kind: MessageKind, payload: impl Into<Vec<u8>>, is_final: bool) -> Self {
        Self {
            kind,
            payload: payload.into(),
            is_final,
        }
    }
}
