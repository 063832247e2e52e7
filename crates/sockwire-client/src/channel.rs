use std::sync::Arc;

use sockwire_frame::Value;

use crate::ack::AckEmitter;
use crate::error::Result;
use crate::event::{Event, HandlerId};
use crate::session::{Command, SessionInner};

/// One logical channel (path) of a session.
///
/// Cheap to clone. Holding a `Channel` keeps its session alive.
#[derive(Debug, Clone)]
pub struct Channel {
    inner: Arc<SessionInner>,
    path: String,
}

impl Channel {
    pub(crate) fn new(inner: Arc<SessionInner>, path: String) -> Self {
        Self { inner, path }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Subscribe to `event`.
    pub fn on<F>(&self, event: &str, callback: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner
            .subscribe(&self.path, Some(event.to_string()), false, Arc::new(callback))
    }

    /// Subscribe to the next `event` only.
    pub fn once<F>(&self, event: &str, callback: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner
            .subscribe(&self.path, Some(event.to_string()), true, Arc::new(callback))
    }

    /// Subscribe to every event delivered to this channel, lifecycle events
    /// included. Catch-all handlers run after the named ones.
    pub fn on_any<F>(&self, callback: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.subscribe(&self.path, None, false, Arc::new(callback))
    }

    /// Remove every handler for `event`.
    pub fn off(&self, event: &str) {
        let _ = self.inner.send(Command::RemoveEvent {
            path: self.path.clone(),
            event: event.to_string(),
        });
    }

    pub fn off_id(&self, id: HandlerId) {
        let _ = self.inner.send(Command::RemoveHandler {
            path: self.path.clone(),
            id,
        });
    }

    /// Send `event` to the server. While the channel is not connected the
    /// event is dropped and an `error` event is delivered locally instead.
    pub fn emit(&self, event: &str, items: Vec<Value>) -> Result<()> {
        self.inner.send(Command::Emit {
            path: self.path.clone(),
            event: event.to_string(),
            items,
            ack: None,
        })
    }

    /// Prepare an emit that expects an acknowledgement. The ack id is
    /// reserved now; the event goes out when a handler or timeout is attached.
    pub fn emit_with_ack(&self, event: &str, items: Vec<Value>) -> AckEmitter {
        AckEmitter {
            inner: self.inner.clone(),
            path: self.path.clone(),
            event: event.to_string(),
            items,
            id: self.inner.next_ack_id(),
        }
    }

    /// Ask the server to connect this channel, now if the session is
    /// connected and again after every reconnect.
    pub fn join(&self) -> Result<()> {
        self.inner.send(Command::Join {
            path: self.path.clone(),
        })
    }

    /// Disconnect this channel. Leaving the root channel disconnects the
    /// whole session.
    pub fn leave(&self) -> Result<()> {
        self.inner.send(Command::Leave {
            path: self.path.clone(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected(&self.path)
    }
}
