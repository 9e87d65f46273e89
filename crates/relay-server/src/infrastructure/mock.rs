//! Scripted transport doubles for unit and integration testing.
//!
//! Allows tests to drive a [`Session`](crate::application::Session) with
//! synthetic frames and to inspect what it sent, without opening a socket.
//!
//! - [`ScriptedFrameSource`] plays back frames pushed through a
//!   [`ScriptHandle`].  Dropping the handle ends the stream (an abrupt
//!   disconnect); [`ScriptHandle::fail`] injects a read error.
//! - [`RecordingSink`] records every text message and close frame it is asked
//!   to send, and can be configured to fail or to stall forever.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use relay_core::{CloseStatus, Frame};

use crate::application::transport::{FrameSource, PeerSink, TransportError};

// ── Frame source ──────────────────────────────────────────────────────────────

enum ScriptItem {
    Frame(Frame),
    Fail(TransportError),
}

/// A [`FrameSource`] fed by a test through a [`ScriptHandle`].
pub struct ScriptedFrameSource {
    rx: mpsc::UnboundedReceiver<ScriptItem>,
}

/// The test's end of a [`ScriptedFrameSource`].
#[derive(Clone)]
pub struct ScriptHandle {
    tx: mpsc::UnboundedSender<ScriptItem>,
}

impl ScriptedFrameSource {
    /// Creates an empty source and the handle that feeds it.
    pub fn new() -> (Self, ScriptHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, ScriptHandle { tx })
    }

    /// Creates a source that yields `frames` and then reports end of stream.
    pub fn from_frames(frames: impl IntoIterator<Item = Frame>) -> Self {
        let (source, handle) = Self::new();
        for frame in frames {
            handle.push(frame);
        }
        source
    }
}

impl ScriptHandle {
    /// Queues one frame for the session to read.
    ///
    /// Panics if the source has been dropped (the session already ended).
    pub fn push(&self, frame: Frame) {
        self.tx
            .send(ScriptItem::Frame(frame))
            .unwrap_or_else(|_| panic!("ScriptHandle::push after the source was dropped"));
    }

    /// Queues a read failure.
    pub fn fail(&self, error: TransportError) {
        // The session may already be gone; that is fine for a failure.
        let _ = self.tx.send(ScriptItem::Fail(error));
    }
}

#[async_trait]
impl FrameSource for ScriptedFrameSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        match self.rx.recv().await {
            Some(ScriptItem::Frame(frame)) => Ok(Some(frame)),
            Some(ScriptItem::Fail(error)) => Err(error),
            None => Ok(None),
        }
    }
}

// ── Sink ──────────────────────────────────────────────────────────────────────

/// How a [`RecordingSink`] reacts to a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkBehaviour {
    /// Record and succeed.
    Accept,
    /// Fail every send with the given error, recording nothing.
    Fail(TransportError),
    /// Never complete.  Used to exercise send timeouts.
    Stall,
}

/// A [`PeerSink`] that records what it was asked to send.
pub struct RecordingSink {
    behaviour: SinkBehaviour,
    sent: Mutex<Vec<String>>,
    closes: Mutex<Vec<Option<CloseStatus>>>,
    activity: Notify,
}

impl RecordingSink {
    /// A sink that accepts everything.
    pub fn new() -> Self {
        Self::with_behaviour(SinkBehaviour::Accept)
    }

    /// A sink whose sends always fail as if the connection were broken.
    pub fn failing() -> Self {
        Self::with_behaviour(SinkBehaviour::Fail(TransportError::Closed))
    }

    /// A sink whose sends never complete.
    pub fn stalling() -> Self {
        Self::with_behaviour(SinkBehaviour::Stall)
    }

    pub fn with_behaviour(behaviour: SinkBehaviour) -> Self {
        Self {
            behaviour,
            sent: Mutex::new(Vec::new()),
            closes: Mutex::new(Vec::new()),
            activity: Notify::new(),
        }
    }

    /// Text messages successfully sent so far, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("lock poisoned").clone()
    }

    /// Close frames sent so far, in order.
    pub fn closes(&self) -> Vec<Option<CloseStatus>> {
        self.closes.lock().expect("lock poisoned").clone()
    }

    /// Waits until at least `count` text messages have been recorded, or
    /// `limit` elapses.  Returns whatever was recorded by then.
    pub async fn wait_for_messages(&self, count: usize, limit: Duration) -> Vec<String> {
        let _ = tokio::time::timeout(limit, async {
            loop {
                // Register interest before checking, so a send that lands
                // between the check and the await still wakes us.
                let notified = self.activity.notified();
                if self.sent.lock().expect("lock poisoned").len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await;
        self.sent()
    }

    async fn gate(&self) -> Result<(), TransportError> {
        match &self.behaviour {
            SinkBehaviour::Accept => Ok(()),
            SinkBehaviour::Fail(error) => Err(error.clone()),
            SinkBehaviour::Stall => std::future::pending().await,
        }
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerSink for RecordingSink {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.gate().await?;
        self.sent.lock().expect("lock poisoned").push(text);
        self.activity.notify_waiters();
        Ok(())
    }

    async fn close(&self, status: Option<CloseStatus>) -> Result<(), TransportError> {
        self.gate().await?;
        self.closes.lock().expect("lock poisoned").push(status);
        self.activity.notify_waiters();
        Ok(())
    }
}
