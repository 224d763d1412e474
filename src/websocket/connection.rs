use crate::error::{PushError, PushResult};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

pub type UserId = i64;

/// Distinguishes concurrent sockets, even for the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Work item for the socket writer owned by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// Handle to one live socket.
///
/// Cloning is cheap and every clone observes the same `open` flag. Writes go
/// through an unbounded queue so a send never blocks the caller; the session
/// actor drains the queue onto the socket.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    sender: UnboundedSender<Outbound>,
    open: Arc<AtomicBool>,
}

impl Connection {
    /// Creates a handle plus the receiving end the socket writer consumes.
    pub fn open(user_id: UserId) -> (Self, UnboundedReceiver<Outbound>) {
        let (sender, rx) = unbounded_channel();
        let connection = Self {
            id: ConnectionId::new(),
            user_id,
            sender,
            open: Arc::new(AtomicBool::new(true)),
        };
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    pub fn send_text(&self, text: String) -> PushResult<()> {
        if !self.open.load(Ordering::Acquire) {
            return Err(PushError::ConnectionClosed);
        }
        self.sender
            .send(Outbound::Text(text))
            .map_err(|_| PushError::ConnectionClosed)
    }

    /// Marks the handle closed and asks the writer to close the socket.
    /// Returns false if it was already closed.
    pub fn close(&self) -> bool {
        if !self.open.swap(false, Ordering::AcqRel) {
            return false;
        }
        // Receiver may already be gone if the socket died first.
        let _ = self.sender.send(Outbound::Close);
        true
    }

    /// Marks the handle closed without queuing a close frame, for when the
    /// socket is already gone.
    pub(crate) fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("open", &self.is_open())
            .finish()
    }
}
