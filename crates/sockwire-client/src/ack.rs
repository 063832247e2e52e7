use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sockwire_engine::ScheduledTask;
use sockwire_frame::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::{ClientError, Result};
use crate::session::{Command, SessionInner};

/// Outcome delivered to an acknowledgement callback.
#[derive(Debug, Clone, PartialEq)]
pub enum AckResponse {
    /// The reply payload.
    Ack(Vec<Value>),
    TimedOut,
}

pub(crate) type AckCallback = Box<dyn FnOnce(AckResponse) + Send>;

/// An acknowledgement request travelling with an emit.
pub(crate) struct AckRequest {
    pub(crate) id: u64,
    pub(crate) timeout: Duration,
    pub(crate) callback: AckCallback,
}

impl fmt::Debug for AckRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckRequest")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

struct PendingAck {
    callback: AckCallback,
    // Held so the timeout is cancelled when the ack resolves.
    _timer: Option<ScheduledTask>,
}

/// Pending acknowledgements keyed by ack id.
#[derive(Default)]
pub(crate) struct AckRegistry {
    pending: HashMap<u64, PendingAck>,
}

impl AckRegistry {
    pub(crate) fn register(&mut self, id: u64, callback: AckCallback, timer: Option<ScheduledTask>) {
        self.pending.insert(
            id,
            PendingAck {
                callback,
                _timer: timer,
            },
        );
    }

    /// Deliver a reply. Returns `false` for unknown (late or duplicate) ids.
    pub(crate) fn resolve(&mut self, id: u64, items: Vec<Value>) -> bool {
        match self.pending.remove(&id) {
            Some(pending) => {
                (pending.callback)(AckResponse::Ack(items));
                true
            }
            None => false,
        }
    }

    /// Deliver a timeout. Returns `false` if the ack already resolved.
    pub(crate) fn time_out(&mut self, id: u64) -> bool {
        match self.pending.remove(&id) {
            Some(pending) => {
                (pending.callback)(AckResponse::TimedOut);
                true
            }
            None => false,
        }
    }

    /// Drop every pending callback without invoking it.
    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

impl fmt::Debug for AckRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.pending.keys().collect();
        ids.sort();
        f.debug_struct("AckRegistry").field("pending", &ids).finish()
    }
}

/// An emit that waits for an acknowledgement.
///
/// Nothing is sent until [`AckEmitter::timing_out_after`] or
/// [`AckEmitter::response`] is called.
#[must_use = "the event is only sent once a timeout or handler is attached"]
pub struct AckEmitter {
    pub(crate) inner: Arc<SessionInner>,
    pub(crate) path: String,
    pub(crate) event: String,
    pub(crate) items: Vec<Value>,
    pub(crate) id: u64,
}

impl AckEmitter {
    /// The ack id this emit carries.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Send the event. `callback` receives the reply, or
    /// [`AckResponse::TimedOut`] once `timeout` elapses. A zero timeout
    /// waits indefinitely.
    pub fn timing_out_after<F>(self, timeout: Duration, callback: F)
    where
        F: FnOnce(AckResponse) + Send + 'static,
    {
        let _ = self.inner.commands.send(Command::Emit {
            path: self.path,
            event: self.event,
            items: self.items,
            ack: Some(AckRequest {
                id: self.id,
                timeout,
                callback: Box::new(callback),
            }),
        });
    }

    /// Send the event and wait for the reply payload.
    pub async fn response(self, timeout: Duration) -> Result<Vec<Value>> {
        let (tx, rx) = oneshot::channel();
        self.timing_out_after(timeout, move |response| {
            let _ = tx.send(response);
        });
        match rx.await {
            Ok(AckResponse::Ack(items)) => Ok(items),
            Ok(AckResponse::TimedOut) => Err(ClientError::AckTimeout(timeout)),
            Err(_) => Err(ClientError::AckDropped),
        }
    }
}

impl fmt::Debug for AckEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckEmitter")
            .field("path", &self.path)
            .field("event", &self.event)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Reply handle for an inbound event that asked for an acknowledgement.
#[derive(Clone)]
pub struct AckReply {
    commands: mpsc::UnboundedSender<Command>,
    path: String,
    id: u64,
    sent: Arc<AtomicBool>,
}

impl AckReply {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>, path: String, id: u64) -> Self {
        Self {
            commands,
            path,
            id,
            sent: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Send the acknowledgement. Only the first call sends; later calls
    /// return `false`.
    pub fn send(&self, items: Vec<Value>) -> bool {
        if self.sent.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.commands
            .send(Command::SendAck {
                path: self.path.clone(),
                id: self.id,
                items,
            })
            .is_ok()
    }

    pub fn is_sent(&self) -> bool {
        self.sent.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for AckReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckReply")
            .field("path", &self.path)
            .field("id", &self.id)
            .field("sent", &self.is_sent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recording(log: &Arc<Mutex<Vec<AckResponse>>>) -> AckCallback {
        let log = log.clone();
        Box::new(move |response| log.lock().unwrap().push(response))
    }

    #[test]
    fn resolves_once_and_ignores_duplicates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut acks = AckRegistry::default();
        acks.register(4, recording(&log), None);

        assert!(acks.resolve(4, vec![Value::from("ok")]));
        assert!(!acks.resolve(4, vec![Value::from("again")]));
        assert!(!acks.time_out(4));
        assert_eq!(
            *log.lock().unwrap(),
            vec![AckResponse::Ack(vec![Value::from("ok")])]
        );
    }

    #[test]
    fn timeout_removes_and_late_reply_is_ignored() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut acks = AckRegistry::default();
        acks.register(1, recording(&log), None);
        assert!(acks.time_out(1));
        assert!(!acks.resolve(1, Vec::new()));
        assert_eq!(*log.lock().unwrap(), vec![AckResponse::TimedOut]);
        assert_eq!(acks.len(), 0);
    }

    #[test]
    fn clear_drops_without_invoking() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut acks = AckRegistry::default();
        acks.register(1, recording(&log), None);
        acks.register(2, recording(&log), None);
        acks.clear();
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(acks.len(), 0);
    }

    #[test]
    fn reply_sends_at_most_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reply = AckReply::new(tx, "/admin".to_string(), 9);
        assert!(reply.send(vec![Value::from(true)]));
        assert!(!reply.clone().send(vec![Value::from(false)]));
        assert!(reply.is_sent());
        match rx.try_recv() {
            Ok(Command::SendAck { path, id, items }) => {
                assert_eq!(path, "/admin");
                assert_eq!(id, 9);
                assert_eq!(items, vec![Value::from(true)]);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }
}
