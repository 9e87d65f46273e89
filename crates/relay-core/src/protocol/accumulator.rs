//! Reassembly of fragmented logical messages.
//!
//! TCP delivers bytes, WebSocket delivers frames, but the relay reasons about
//! whole *messages*.  A single text message can legally arrive as one frame or
//! as any number of fragments, and the session loop must broadcast it exactly
//! once with the fully concatenated payload.
//!
//! [`FrameAccumulator`] buffers fragment payloads until a frame marked final
//! arrives, then yields one [`AssembledMessage`].  The type of the final frame
//! decides the message type.
//!
//! # Size cap
//!
//! Every `push` checks the would-be length against
//! `max_message_size` *before* copying, and fails with
//! [`ProtocolError::MessageTooLarge`] once it would be exceeded.

use crate::protocol::error::ProtocolError;
use crate::protocol::frame::{Frame, MessageKind};

/// Default cap on the size of one logical message: 1 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Capacity the buffer starts with and is re-created with after each message.
const INITIAL_CAPACITY: usize = 4 * 1024;

/// A complete logical message produced by the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    /// Message type, taken from the final frame.
    pub kind: MessageKind,
    /// Concatenated payload of every fragment.
    pub payload: Vec<u8>,
    /// How many physical frames the message arrived in (at least 1).
    pub fragments: usize,
}

/// Buffers fragment payloads until a logical message is complete.
#[derive(Debug)]
pub struct FrameAccumulator {
    buffer: Vec<u8>,
    fragments: usize,
    max_message_size: usize,
}

impl FrameAccumulator {
    /// Creates an accumulator that rejects messages larger than
    /// `max_message_size` bytes.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            fragments: 0,
            max_message_size,
        }
    }

    /// The configured size cap in bytes.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Number of payload bytes buffered for the message in progress.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// `true` when no partial message is buffered.
    pub fn is_idle(&self) -> bool {
        self.fragments == 0
    }

    /// Feeds one physical frame.
    ///
    /// Returns `Ok(Some(message))` when `frame` completes a logical message,
    /// and `Ok(None)` while more fragments are still expected.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MessageTooLarge`] if appending `frame` would
    /// push the message past the size cap.  The partial message is discarded
    /// and the accumulator is ready for a fresh message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use relay_core::{Frame, FrameAccumulator, MessageKind};
    ///
    /// let mut acc = FrameAccumulator::new(1024);
    /// assert!(acc.push(Frame::fragment(MessageKind::Text, "hel", false)).unwrap().is_none());
    /// let msg = acc.push(Frame::fragment(MessageKind::Text, "lo", true)).unwrap().unwrap();
    /// assert_eq!(msg.payload, b"hello");
    /// assert_eq!(msg.fragments, 2);
    /// ```
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>, ProtocolError> {
        let attempted = self.buffer.len() + frame.payload.len();
        if attempted > self.max_message_size {
            self.reset();
            return Err(ProtocolError::MessageTooLarge {
                limit: self.max_message_size,
                attempted,
            });
        }

        self.fragments += 1;

        if !frame.is_final {
            if self.buffer.capacity() == 0 {
                self.buffer.reserve(INITIAL_CAPACITY.min(self.max_message_size));
            }
            self.buffer.extend_from_slice(&frame.payload);
            return Ok(None);
        }

        // Unfragmented message: hand the frame's own allocation through.
        let payload = if self.buffer.is_empty() {
            frame.payload
        } else {
            self.buffer.extend_from_slice(&frame.payload);
            std::mem::take(&mut self.buffer)
        };

        let fragments = std::mem::replace(&mut self.fragments, 0);
        Ok(Some(AssembledMessage {
            kind: frame.kind,
            payload,
            fragments,
        }))
    }

    /// Discards any partially accumulated message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.fragments = 0;
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_final_frame_yields_message_immediately() {
        // Arrange
        let mut acc = FrameAccumulator::new(64);

        // Act
        let msg = acc.push(Frame::text("hi")).unwrap();

        // Assert
        let msg = msg.expect("final frame must complete the message");
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.payload, b"hi");
        assert_eq!(msg.fragments, 1);
        assert!(acc.is_idle());
    }

    #[test]
    fn test_fragments_are_concatenated_in_order() {
        let mut acc = FrameAccumulator::new(64);

        assert_eq!(acc.push(Frame::fragment(MessageKind::Text, "a", false)).unwrap(), None);
        assert_eq!(acc.push(Frame::fragment(MessageKind::Text, "bc", false)).unwrap(), None);
        assert_eq!(acc.buffered_len(), 3);
        let msg = acc
            .push(Frame::fragment(MessageKind::Text, "def", true))
            .unwrap()
            .unwrap();

        assert_eq!(msg.payload, b"abcdef");
        assert_eq!(msg.fragments, 3);
        assert_eq!(acc.buffered_len(), 0);
    }

    #[test]
    fn test_final_frame_kind_is_authoritative() {
        let mut acc = FrameAccumulator::new(64);
        acc.push(Frame::fragment(MessageKind::Binary, vec![0x68], false))
            .unwrap();
        let msg = acc
            .push(Frame::fragment(MessageKind::Text, "i", true))
            .unwrap()
            .unwrap();
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.payload, b"hi");
    }

    #[test]
    fn test_consecutive_messages_do_not_bleed_into_each_other() {
        let mut acc = FrameAccumulator::new(64);
        acc.push(Frame::fragment(MessageKind::Text, "one", false)).unwrap();
        let first = acc.push(Frame::fragment(MessageKind::Text, "!", true)).unwrap().unwrap();
        let second = acc.push(Frame::text("two")).unwrap().unwrap();

        assert_eq!(first.payload, b"one!");
        assert_eq!(second.payload, b"two");
        assert_eq!(second.fragments, 1);
    }

    #[test]
    fn test_empty_final_frame_yields_empty_message() {
        let mut acc = FrameAccumulator::new(64);
        let msg = acc.push(Frame::text("")).unwrap().unwrap();
        assert!(msg.payload.is_empty());
    }

    #[test]
    fn test_message_exactly_at_limit_is_accepted() {
        let mut acc = FrameAccumulator::new(4);
        acc.push(Frame::fragment(MessageKind::Text, "ab", false)).unwrap();
        let msg = acc.push(Frame::fragment(MessageKind::Text, "cd", true)).unwrap();
        assert!(msg.is_some());
    }

    #[test]
    fn test_message_over_limit_is_rejected_and_buffer_reset() {
        let mut acc = FrameAccumulator::new(4);
        acc.push(Frame::fragment(MessageKind::Text, "abc", false)).unwrap();

        let err = acc
            .push(Frame::fragment(MessageKind::Text, "de", false))
            .unwrap_err();

        assert_eq!(
            err,
            ProtocolError::MessageTooLarge {
                limit: 4,
                attempted: 5
            }
        );
        assert!(acc.is_idle());
        assert_eq!(acc.buffered_len(), 0);
    }

    #[test]
    fn test_single_oversized_frame_is_rejected() {
        let mut acc = FrameAccumulator::new(2);
        let result = acc.push(Frame::text("toolong"));
        assert!(matches!(result, Err(ProtocolError::MessageTooLarge { .. })));
    }

    #[test]
    fn test_accumulator_is_usable_after_rejection() {
        let mut acc = FrameAccumulator::new(3);
        let _ = acc.push(Frame::text("abcd"));
        let msg = acc.push(Frame::text("ok")).unwrap().unwrap();
        assert_eq!(msg.payload, b"ok");
    }

    #[test]
    fn test_default_uses_one_mebibyte_cap() {
        assert_eq!(FrameAccumulator::default().max_message_size(), 1024 * 1024);
    }
}
