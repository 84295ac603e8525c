//! Connection adapter: the session-facing handle for one client.
//!
//! A [`PlayerHandle`] owns the outbound queue feeding the connection's
//! writer task, plus the small mutable record of what the connection
//! currently is: its assigned mark and the identifier of the session
//! it routes into. The session reference is identifier-based on
//! purpose: teardown of a session is never blocked by a lingering
//! player, and routing always goes through the registry.

use crate::game::Mark;
use crate::message::{MessageType, ServerMessage};
use crate::session::SessionId;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// Item on a connection's outbound queue.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A serialized-on-send wire message.
    Message(ServerMessage),
    /// Instruction to close the transport and stop the writer.
    Close,
}

/// Mutable per-connection state, guarded for access from both the
/// connection's read loop and session workers.
#[derive(Debug, Default)]
struct Binding {
    mark: Option<Mark>,
    session_id: Option<SessionId>,
}

/// One connected client as seen by sessions and the registry.
#[derive(Debug)]
pub struct PlayerHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    binding: Mutex<Binding>,
}

impl PlayerHandle {
    /// Wraps the sending half of a connection's outbound queue.
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            outbound,
            binding: Mutex::new(Binding::default()),
        }
    }

    /// The mark this connection plays as, if bound.
    pub fn mark(&self) -> Option<Mark> {
        self.binding.lock().unwrap().mark
    }

    /// Identifier of the session this connection routes into.
    pub fn session_id(&self) -> Option<SessionId> {
        self.binding.lock().unwrap().session_id.clone()
    }

    /// Points this connection at a session slot. Called by the session
    /// worker on bind, including the rebind when a rematch spawns.
    pub fn bind_to(&self, session_id: SessionId, mark: Mark) {
        let mut binding = self.binding.lock().unwrap();
        binding.session_id = Some(session_id);
        binding.mark = Some(mark);
    }

    /// Queues a wire message, stamping the recipient's own mark into
    /// the `char` field. Delivery failures mean the writer is gone;
    /// the read loop notices the closed transport on its own.
    pub fn deliver(&self, mut message: ServerMessage) {
        message.mark = self.mark().into();
        if self.outbound.send(Outbound::Message(message)).is_err() {
            debug!("dropping message for closed connection");
        }
    }

    /// Queues a session-less reply, used before the connection is
    /// bound or when its session is gone.
    pub fn reply(&self, message_type: MessageType, text: impl Into<String>) {
        self.deliver(ServerMessage::bare(message_type, text));
    }

    /// Tells the writer task to close the transport.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Identity comparison; slots are occupied by connections, not
    /// names, so two handles are the same player iff they are the
    /// same allocation.
    pub fn same_as(a: &Arc<Self>, b: &Arc<Self>) -> bool {
        Arc::ptr_eq(a, b)
    }
}
