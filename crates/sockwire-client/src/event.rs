use std::fmt;
use std::sync::Arc;

use sockwire_frame::Value;

use crate::ack::AckReply;

/// Names of the events the session itself delivers to channel handlers.
pub mod client_event {
    /// The channel joined. Items: `[path]`.
    pub const CONNECT: &str = "connect";
    /// The channel or the whole session disconnected. Items: `[reason]`.
    pub const DISCONNECT: &str = "disconnect";
    /// Transport, handshake or usage error. Items: `[details..]`.
    pub const ERROR: &str = "error";
    /// The transport dropped and reconnection starts. Items: `[reason]`.
    pub const RECONNECT: &str = "reconnect";
    /// A reconnect attempt begins. Items: `[remaining]`, `-1` when unlimited.
    pub const RECONNECT_ATTEMPT: &str = "reconnectAttempt";
    /// Session status changed. Items: `[status]`.
    pub const STATUS_CHANGE: &str = "statusChange";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    /// The streaming socket became the primary transport.
    pub const WEBSOCKET_UPGRADE: &str = "websocketUpgrade";
}

/// An event delivered to handlers.
#[derive(Clone)]
pub struct Event {
    pub name: String,
    pub items: Vec<Value>,
    /// Present when the sender asked for an acknowledgement.
    pub ack: Option<AckReply>,
}

impl Event {
    pub fn new(name: impl Into<String>, items: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            items,
            ack: None,
        }
    }

    pub fn item(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    /// Reply to the sender. Returns `false` if no reply was requested or one
    /// was already sent.
    pub fn reply(&self, items: Vec<Value>) -> bool {
        self.ack.as_ref().is_some_and(|ack| ack.send(items))
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("items", &self.items)
            .field("ack_id", &self.ack.as_ref().map(AckReply::id))
            .finish()
    }
}

/// Subscriber callback. Runs on the session task.
pub type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Identifies one subscription for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u64);

#[derive(Clone)]
pub(crate) struct Handler {
    pub(crate) id: HandlerId,
    /// `None` subscribes to every event.
    pub(crate) event: Option<String>,
    pub(crate) once: bool,
    pub(crate) callback: Callback,
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("event", &self.event)
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}

/// Subscriptions of one channel.
#[derive(Debug, Default)]
pub(crate) struct Handlers {
    entries: Vec<Handler>,
}

impl Handlers {
    pub(crate) fn add(&mut self, handler: Handler) {
        self.entries.push(handler);
    }

    pub(crate) fn remove_id(&mut self, id: HandlerId) {
        self.entries.retain(|h| h.id != id);
    }

    pub(crate) fn remove_event(&mut self, event: &str) {
        self.entries.retain(|h| h.event.as_deref() != Some(event));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Callbacks to run for `event`: named subscriptions first, then
    /// catch-alls. `once` subscriptions are removed before the caller runs
    /// anything, so callbacks may freely subscribe or unsubscribe.
    pub(crate) fn take_for(&mut self, event: &str) -> Vec<Callback> {
        let mut named = Vec::new();
        let mut any = Vec::new();
        for handler in &self.entries {
            match handler.event.as_deref() {
                Some(name) if name == event => named.push(handler.callback.clone()),
                None => any.push(handler.callback.clone()),
                Some(_) => {}
            }
        }
        self.entries.retain(|h| {
            !(h.once && (h.event.is_none() || h.event.as_deref() == Some(event)))
        });
        named.extend(any);
        named
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting(counter: &Arc<AtomicUsize>) -> Callback {
        let counter = counter.clone();
        Arc::new(move |_event: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn handler(id: u64, event: Option<&str>, once: bool, callback: Callback) -> Handler {
        Handler {
            id: HandlerId(id),
            event: event.map(str::to_string),
            once,
            callback,
        }
    }

    #[test]
    fn once_handlers_are_removed_on_first_match() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handlers = Handlers::default();
        handlers.add(handler(1, Some("chat"), true, counting(&counter)));
        handlers.add(handler(2, Some("chat"), false, counting(&counter)));
        handlers.add(handler(3, Some("other"), true, counting(&counter)));

        let event = Event::new("chat", Vec::new());
        for callback in handlers.take_for("chat") {
            callback(&event);
        }
        for callback in handlers.take_for("chat") {
            callback(&event);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(handlers.len(), 2);
    }

    #[test]
    fn catch_all_runs_after_named() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut handlers = Handlers::default();
        for (id, event) in [(1, None), (2, Some("x"))] {
            let order = order.clone();
            handlers.add(handler(
                id,
                event,
                false,
                Arc::new(move |_e: &Event| order.lock().unwrap().push(id)),
            ));
        }
        let event = Event::new("x", Vec::new());
        for callback in handlers.take_for("x") {
            callback(&event);
        }
        assert_eq!(*order.lock().unwrap(), vec![2, 1]);
    }

    #[test]
    fn removal_by_id_and_event() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handlers = Handlers::default();
        handlers.add(handler(1, Some("a"), false, counting(&counter)));
        handlers.add(handler(2, Some("a"), false, counting(&counter)));
        handlers.add(handler(3, Some("b"), false, counting(&counter)));
        handlers.remove_id(HandlerId(1));
        assert_eq!(handlers.take_for("a").len(), 1);
        handlers.remove_event("a");
        assert!(handlers.take_for("a").is_empty());
        assert_eq!(handlers.len(), 1);
    }

    #[test]
    fn reply_without_ack_is_refused() {
        assert!(!Event::new("x", Vec::new()).reply(vec![Value::from(1i64)]));
    }
}
