//! tungstenite adapters for the transport ports.
//!
//! After the HTTP upgrade (see `infrastructure::routes`) a [`WebSocketStream`]
//! is split into its read and write halves:
//!
//! - the read half becomes a [`WsFrameSource`], owned by the session loop;
//! - the write half becomes a [`WsPeerSink`], shared through the registry.
//!   The write half sits behind a `tokio::sync::Mutex` so that any number of
//!   broadcasting tasks can send to it; each send holds the lock only for the
//!   duration of one message.
//!
//! # Fragments
//!
//! tungstenite reassembles fragmented messages itself (bounded by
//! `WebSocketConfig::max_message_size`) and only ever yields complete
//! messages, so every [`Frame`] produced here is final.  The session's own
//! accumulator then sees single-frame messages and passes them straight
//! through.
//!
//! # Text validation
//!
//! tungstenite checks that every text message is UTF-8 before yielding it.
//! A failed check surfaces as [`TransportError::InvalidPayload`], which the
//! session answers with close code 1007.
//!
//! # Control frames
//!
//! Ping/Pong are answered by tungstenite and never reach the session.  When
//! the peer sends a Close frame, tungstenite queues an echo carrying the same
//! code and reason; the session's [`PeerSink::close`] call flushes it.  The
//! explicit close frame is then refused by tungstenite, which `close` treats
//! as success.

use std::borrow::Cow;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::error::CapacityError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::error::ProtocolError as WsProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;

use relay_core::{CloseStatus, Frame};

use crate::application::transport::{FrameSource, PeerSink, TransportError};

/// Splits an upgraded stream into the session's receive side and the shared
/// send side.
pub fn split_stream<S>(ws_stream: WebSocketStream<S>) -> (WsFrameSource<S>, WsPeerSink<S>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (ws_tx, ws_rx) = ws_stream.split();
    (
        WsFrameSource { stream: ws_rx },
        WsPeerSink {
            sink: Mutex::new(ws_tx),
        },
    )
}

// ── Receive side ──────────────────────────────────────────────────────────────

/// [`FrameSource`] over the read half of a WebSocket stream.
pub struct WsFrameSource<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> FrameSource for WsFrameSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(map_ws_error(e)),
                None => return Ok(None),
            };

            if let Some(frame) = message_to_frame(message) {
                return Ok(Some(frame));
            }
        }
    }
}

/// Converts a tungstenite message into a relay frame.
///
/// Returns `None` for control traffic the session never sees.
pub fn message_to_frame(message: WsMessage) -> Option<Frame> {
    match message {
        WsMessage::Text(text) => Some(Frame::text(text)),
        WsMessage::Binary(data) => Some(Frame::binary(data)),
        WsMessage::Close(close) => {
            let status = close.as_ref().map(close_frame_to_status);
            Some(Frame::close(CloseStatus::encode_optional(status.as_ref())))
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => None,
    }
}

fn close_frame_to_status(frame: &CloseFrame<'_>) -> CloseStatus {
    CloseStatus::new(u16::from(frame.code), frame.reason.as_ref())
}

fn status_to_close_frame(status: CloseStatus) -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::from(status.code),
        reason: Cow::Owned(status.reason),
    }
}

/// Maps a tungstenite error onto the transport error taxonomy.
pub fn map_ws_error(error: WsError) -> TransportError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        WsError::Capacity(CapacityError::MessageTooLong { size, max_size }) => {
            TransportError::MessageTooLarge {
                size,
                limit: max_size,
            }
        }
        WsError::Utf8 => TransportError::InvalidPayload,
        other => TransportError::Io(other.to_string()),
    }
}

// ── Send side ─────────────────────────────────────────────────────────────────

/// [`PeerSink`] over the write half of a WebSocket stream.
pub struct WsPeerSink<S> {
    sink: Mutex<SplitSink<WebSocketStream<S>, WsMessage>>,
}

#[async_trait]
impl<S> PeerSink for WsPeerSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        sink.send(WsMessage::Text(text)).await.map_err(map_ws_error)
    }

    async fn close(&self, status: Option<CloseStatus>) -> Result<(), TransportError> {
        let frame = status.map(status_to_close_frame);
        let mut sink = self.sink.lock().await;
        match sink.send(WsMessage::Close(frame)).await {
            Ok(()) => Ok(()),
            // The closing handshake is already under way; push out the echo.
            Err(WsError::Protocol(WsProtocolError::SendAfterClosing)) => {
                match sink.flush().await {
                    Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
                    Err(e) => Err(map_ws_error(e)),
                }
            }
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(map_ws_error(e)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::MessageKind;
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::{Data, OpCode};
    use tokio_tungstenite::tungstenite::protocol::frame::Frame as WsFrame;
    use tokio_tungstenite::tungstenite::protocol::Role;

    /// A connected (server, client) WebSocket pair over an in-memory pipe.
    async fn ws_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        (server, client)
    }

    #[test]
    fn test_text_message_maps_to_final_text_frame() {
        let frame = message_to_frame(WsMessage::Text("hi".to_string())).unwrap();
        assert_eq!(frame, Frame::text("hi"));
    }

    #[test]
    fn test_binary_message_maps_to_binary_frame() {
        let frame = message_to_frame(WsMessage::Binary(vec![1, 2])).unwrap();
        assert_eq!(frame.kind, MessageKind::Binary);
    }

    #[test]
    fn test_close_message_carries_encoded_status() {
        let frame = message_to_frame(WsMessage::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "leaving".into(),
        })))
        .unwrap();

        assert_eq!(frame.kind, MessageKind::Close);
        assert_eq!(
            CloseStatus::decode(&frame.payload).unwrap(),
            Some(CloseStatus::new(1001, "leaving"))
        );
    }

    #[test]
    fn test_close_without_status_has_empty_payload() {
        let frame = message_to_frame(WsMessage::Close(None)).unwrap();
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_ping_and_pong_are_hidden() {
        assert!(message_to_frame(WsMessage::Ping(vec![1])).is_none());
        assert!(message_to_frame(WsMessage::Pong(vec![1])).is_none());
    }

    #[test]
    fn test_status_to_close_frame_keeps_private_code() {
        let frame = status_to_close_frame(CloseStatus::new(4000, "x"));
        assert_eq!(u16::from(frame.code), 4000);
        assert_eq!(frame.reason, "x");
    }

    #[test]
    fn test_map_ws_error_connection_closed() {
        assert_eq!(map_ws_error(WsError::ConnectionClosed), TransportError::Closed);
        assert_eq!(map_ws_error(WsError::AlreadyClosed), TransportError::Closed);
    }

    #[test]
    fn test_map_ws_error_message_too_long() {
        let err = WsError::Capacity(CapacityError::MessageTooLong {
            size: 10,
            max_size: 5,
        });
        assert_eq!(
            map_ws_error(err),
            TransportError::MessageTooLarge { size: 10, limit: 5 }
        );
    }

    #[test]
    fn test_map_ws_error_utf8_is_invalid_payload() {
        assert_eq!(map_ws_error(WsError::Utf8), TransportError::InvalidPayload);
    }

    #[tokio::test]
    async fn test_source_reports_non_utf8_text_as_invalid_payload() {
        // Arrange
        let (server, mut client) = ws_pair().await;
        let (mut source, _sink) = split_stream(server);

        // Act: a raw text frame carrying bytes that are not UTF-8
        client
            .send(WsMessage::Frame(WsFrame::message(
                vec![0xFF, 0xFE],
                OpCode::Data(Data::Text),
                true,
            )))
            .await
            .unwrap();
        let result = source.next_frame().await;

        // Assert
        assert_eq!(result, Err(TransportError::InvalidPayload));
    }

    #[tokio::test]
    async fn test_source_reads_text_from_peer() {
        // Arrange
        let (server, mut client) = ws_pair().await;
        let (mut source, _sink) = split_stream(server);

        // Act
        client.send(WsMessage::Text("hello".to_string())).await.unwrap();
        let frame = source.next_frame().await.unwrap();

        // Assert
        assert_eq!(frame, Some(Frame::text("hello")));
    }

    #[tokio::test]
    async fn test_sink_delivers_text_to_peer() {
        let (server, mut client) = ws_pair().await;
        let (_source, sink) = split_stream(server);

        sink.send_text("relayed".to_string()).await.unwrap();
        let received = client.next().await.unwrap().unwrap();

        assert_eq!(received, WsMessage::Text("relayed".to_string()));
    }

    #[tokio::test]
    async fn test_close_is_echoed_with_same_code_and_reason() {
        // Arrange
        let (server, mut client) = ws_pair().await;
        let (mut source, sink) = split_stream(server);

        // Act: client closes, server reads the close and acknowledges it
        client
            .close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "leaving".into(),
            }))
            .await
            .unwrap();
        let frame = source.next_frame().await.unwrap().unwrap();
        let status = CloseStatus::decode(&frame.payload).unwrap();
        sink.close(status).await.unwrap();

        // Assert: the client sees the echo
        let echo = tokio::time::timeout(Duration::from_secs(1), client.next())
            .await
            .expect("echo must arrive")
            .expect("stream must yield the close")
            .expect("close must not be an error");
        match echo {
            WsMessage::Close(Some(frame)) => {
                assert_eq!(frame.code, CloseCode::Away);
                assert_eq!(frame.reason, "leaving");
            }
            other => panic!("expected a close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_source_ends_when_peer_vanishes() {
        let (server, client) = ws_pair().await;
        let (mut source, _sink) = split_stream(server);

        drop(client);
        let result = source.next_frame().await;

        // Dropping the pipe without a close frame is either a clean end of
        // stream or a reset, never a frame.
        assert!(matches!(result, Ok(None) | Err(_)));
    }
}
