use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sockwire_engine::{
    schedule_once, Engine, EngineEvent, EngineHandle, EngineUrls, Epoch, ScheduledTask,
};
use sockwire_frame::{normalize_path, Packet, PacketKind, Value, DEFAULT_PATH};
use sockwire_transport::Transports;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::ack::{AckEmitter, AckRegistry, AckReply, AckRequest};
use crate::binary_queue::BinaryQueue;
use crate::channel::Channel;
use crate::config::SessionConfig;
use crate::error::{ClientError, Result};
use crate::event::{client_event, Callback, Event, Handler, HandlerId, Handlers};
use crate::reconnect::{ReconnectPolicy, ReconnectState, ReconnectStep};
use crate::status::ClientStatus;

/// Everything handles can ask of the session task.
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect,
    Shutdown,
    AddChannel {
        path: String,
    },
    RemoveChannel {
        path: String,
    },
    Join {
        path: String,
    },
    Leave {
        path: String,
    },
    AddHandler {
        path: String,
        handler: Handler,
    },
    RemoveHandler {
        path: String,
        id: HandlerId,
    },
    RemoveEvent {
        path: String,
        event: String,
    },
    Emit {
        path: String,
        event: String,
        items: Vec<Value>,
        ack: Option<AckRequest>,
    },
    SendAck {
        path: String,
        id: u64,
        items: Vec<Value>,
    },
    /// An engine event stamped with the engine generation it came from.
    Engine {
        epoch: u64,
        event: EngineEvent,
    },
    ReconnectTick {
        epoch: u64,
    },
    ConnectTimeout {
        epoch: u64,
    },
    AckTimeout {
        id: u64,
    },
}

/// State shared by every [`Session`] and [`Channel`] handle.
///
/// Dropping the last handle shuts the session task down.
pub(crate) struct SessionInner {
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    next_ack: AtomicU64,
    next_handler: AtomicU64,
    status: watch::Receiver<ClientStatus>,
    connected_paths: watch::Receiver<BTreeSet<String>>,
    default_path: String,
}

impl SessionInner {
    pub(crate) fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::SessionClosed)
    }

    pub(crate) fn next_ack_id(&self) -> u64 {
        self.next_ack.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn subscribe(
        &self,
        path: &str,
        event: Option<String>,
        once: bool,
        callback: Callback,
    ) -> HandlerId {
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::Relaxed));
        let _ = self.commands.send(Command::AddHandler {
            path: path.to_string(),
            handler: Handler {
                id,
                event,
                once,
                callback,
            },
        });
        id
    }

    pub(crate) fn status(&self) -> ClientStatus {
        *self.status.borrow()
    }

    pub(crate) fn is_connected(&self, path: &str) -> bool {
        self.status() == ClientStatus::Connected && self.connected_paths.borrow().contains(path)
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

impl fmt::Debug for SessionInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionInner")
            .field("status", &self.status())
            .field("default_path", &self.default_path)
            .finish_non_exhaustive()
    }
}

/// A client session: one transport engine shared by any number of channels.
///
/// `Session` is a cheap handle; clones drive the same session. The methods
/// `on`, `emit` and friends act on the default channel.
///
/// Handlers that capture a [`Channel`] or `Session` keep the session alive
/// until they are removed or the session is told to [`Session::disconnect`].
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Start a session for `url` with the given collaborators. Nothing is
    /// sent until [`Session::connect`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(url: &str, config: SessionConfig, transports: Transports) -> Result<Self> {
        config.validate()?;
        EngineUrls::new(url, &config.engine_config())?;

        let default_path = config.default_channel_path();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ClientStatus::NotConnected);
        let (paths_tx, paths_rx) = watch::channel(BTreeSet::new());

        let mut channels = BTreeMap::new();
        channels.insert(DEFAULT_PATH.to_string(), ChannelState::joined());
        channels
            .entry(default_path.clone())
            .or_insert_with(ChannelState::joined);

        let task = SessionTask {
            url: url.to_string(),
            policy: config.reconnect_policy(),
            config,
            transports,
            commands: commands_tx.clone(),
            status: status_tx,
            connected_paths: paths_tx,
            channels,
            engine: None,
            engine_epoch: Epoch::new(),
            acks: AckRegistry::default(),
            binary: BinaryQueue::default(),
            reconnect: ReconnectState::default(),
            reconnect_epoch: Epoch::new(),
            reconnect_timer: None,
            connect_epoch: Epoch::new(),
            connect_timer: None,
        };
        tokio::spawn(task.run(commands_rx));

        Ok(Self {
            inner: Arc::new(SessionInner {
                commands: commands_tx,
                next_ack: AtomicU64::new(0),
                next_handler: AtomicU64::new(0),
                status: status_rx,
                connected_paths: paths_rx,
                default_path,
            }),
        })
    }

    /// A session over `reqwest` long-polling and a `tokio-tungstenite`
    /// streaming socket, honouring the configured TLS policy.
    #[cfg(feature = "native")]
    pub fn native(url: &str, config: SessionConfig) -> Result<Self> {
        let transports = Transports::native(&config.tls)?;
        Self::new(url, config, transports)
    }

    /// Start connecting. A no-op while connecting or connected.
    pub fn connect(&self) -> Result<()> {
        self.inner.send(Command::Connect)
    }

    /// Disconnect every channel and close the engine. Suppresses reconnection
    /// and drops pending acknowledgements.
    pub fn disconnect(&self) -> Result<()> {
        self.inner.send(Command::Disconnect)
    }

    pub fn status(&self) -> ClientStatus {
        self.inner.status()
    }

    /// Watch status transitions.
    pub fn status_changes(&self) -> watch::Receiver<ClientStatus> {
        self.inner.status.clone()
    }

    /// Wait until the session is connected. Fails if it ends up
    /// disconnected first.
    pub async fn wait_until_connected(&self) -> Result<()> {
        let mut status = self.status_changes();
        let reached = status
            .wait_for(|s| matches!(s, ClientStatus::Connected | ClientStatus::Disconnected))
            .await
            .map_err(|_| ClientError::SessionClosed)?;
        match *reached {
            ClientStatus::Connected => Ok(()),
            _ => Err(ClientError::Disconnected),
        }
    }

    /// The channel for `path`, created on first use.
    pub fn channel(&self, path: &str) -> Channel {
        let path = normalize_path(path);
        let _ = self.inner.send(Command::AddChannel { path: path.clone() });
        Channel::new(self.inner.clone(), path)
    }

    pub fn default_channel(&self) -> Channel {
        Channel::new(self.inner.clone(), self.inner.default_path.clone())
    }

    /// Leave `path` and drop its handlers. The root channel cannot be
    /// removed.
    pub fn remove_channel(&self, path: &str) -> Result<()> {
        self.inner.send(Command::RemoveChannel {
            path: normalize_path(path),
        })
    }

    pub fn on<F>(&self, event: &str, callback: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.default_channel().on(event, callback)
    }

    pub fn once<F>(&self, event: &str, callback: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.default_channel().once(event, callback)
    }

    pub fn on_any<F>(&self, callback: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.default_channel().on_any(callback)
    }

    pub fn off(&self, event: &str) {
        self.default_channel().off(event);
    }

    pub fn emit(&self, event: &str, items: Vec<Value>) -> Result<()> {
        self.default_channel().emit(event, items)
    }

    pub fn emit_with_ack(&self, event: &str, items: Vec<Value>) -> AckEmitter {
        self.default_channel().emit_with_ack(event, items)
    }
}

#[derive(Debug, Default)]
struct ChannelState {
    /// Wants to be connected whenever the session is.
    joined: bool,
    connected: bool,
    handlers: Handlers,
}

impl ChannelState {
    fn joined() -> Self {
        Self {
            joined: true,
            ..Self::default()
        }
    }
}

struct SessionTask {
    url: String,
    config: SessionConfig,
    transports: Transports,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Sender<ClientStatus>,
    connected_paths: watch::Sender<BTreeSet<String>>,
    channels: BTreeMap<String, ChannelState>,
    engine: Option<EngineHandle>,
    engine_epoch: Epoch,
    acks: AckRegistry,
    binary: BinaryQueue,
    policy: ReconnectPolicy,
    reconnect: ReconnectState,
    reconnect_epoch: Epoch,
    reconnect_timer: Option<ScheduledTask>,
    connect_epoch: Epoch,
    connect_timer: Option<ScheduledTask>,
}

impl SessionTask {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            if !self.handle(command) {
                break;
            }
        }
        self.shutdown();
    }

    /// Returns `false` once the session should stop.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect(),
            Command::Shutdown => return false,
            Command::AddChannel { path } => {
                self.channels.entry(path).or_default();
            }
            Command::RemoveChannel { path } => self.remove_channel(&path),
            Command::Join { path } => self.join(path),
            Command::Leave { path } => self.leave(&path),
            Command::AddHandler { path, handler } => {
                self.channels.entry(path).or_default().handlers.add(handler);
            }
            Command::RemoveHandler { path, id } => {
                if let Some(channel) = self.channels.get_mut(&path) {
                    channel.handlers.remove_id(id);
                }
            }
            Command::RemoveEvent { path, event } => {
                if let Some(channel) = self.channels.get_mut(&path) {
                    channel.handlers.remove_event(&event);
                }
            }
            Command::Emit {
                path,
                event,
                items,
                ack,
            } => self.emit(path, event, items, ack),
            Command::SendAck { path, id, items } => {
                if self.current_status() == ClientStatus::Connected {
                    self.send_packet(&Packet::ack(&path, items, id));
                } else {
                    warn!(path = %path, ack_id = id, "dropping ack reply while not connected");
                }
            }
            Command::Engine { epoch, event } => {
                if self.engine_epoch.is_current(epoch) {
                    self.on_engine_event(event);
                }
            }
            Command::ReconnectTick { epoch } => {
                if self.reconnect_epoch.is_current(epoch)
                    && self.reconnect.is_reconnecting()
                    && self.current_status() != ClientStatus::Connected
                {
                    self.try_reconnect();
                }
            }
            Command::ConnectTimeout { epoch } => {
                if self.connect_epoch.is_current(epoch)
                    && self.current_status() != ClientStatus::Connected
                {
                    warn!(url = %self.url, "connect timed out");
                    self.fire_all(client_event::ERROR, vec![Value::from("connect timeout")]);
                    self.did_disconnect("connect timeout");
                }
            }
            Command::AckTimeout { id } => {
                if self.acks.time_out(id) {
                    debug!(ack_id = id, "ack timed out");
                }
            }
        }
        true
    }

    fn current_status(&self) -> ClientStatus {
        *self.status.borrow()
    }

    fn set_status(&mut self, status: ClientStatus) {
        if self.current_status() == status {
            return;
        }
        self.status.send_replace(status);
        info!(status = %status, "session status changed");
        self.fire_all(client_event::STATUS_CHANGE, vec![Value::from(status.as_str())]);
    }

    fn connect(&mut self) {
        if self.current_status().is_active() {
            debug!(status = %self.current_status(), "connect ignored");
            return;
        }
        self.cancel_reconnect();
        self.start_connect();
        if let Some(timeout) = self.config.connect_timeout.filter(|t| !t.is_zero()) {
            let epoch = self.connect_epoch.advance();
            self.connect_timer = Some(schedule_once(
                timeout,
                self.commands.clone(),
                Command::ConnectTimeout { epoch },
            ));
        }
    }

    fn start_connect(&mut self) {
        if let Some(engine) = self.engine.take() {
            // Every reconnect attempt gets a fresh handshake, even if the
            // previous attempt is still hanging.
            if !self.config.force_new_engine
                && !self.reconnect.is_reconnecting()
                && !engine.is_closed()
                && self.current_status() == ClientStatus::Connecting
            {
                debug!("engine still handshaking, not replacing it");
                self.engine = Some(engine);
                return;
            }
            engine.close("replaced");
        }
        let epoch = self.engine_epoch.advance();

        let (engine, mut events) = match Engine::spawn(
            &self.url,
            self.config.engine_config(),
            self.transports.clone(),
        ) {
            Ok(started) => started,
            Err(err) => {
                warn!(url = %self.url, error = %err, "failed to start engine");
                self.fire_all(client_event::ERROR, vec![Value::from(err.to_string())]);
                if !self.reconnect.is_reconnecting() {
                    self.did_disconnect("engine start failed");
                }
                return;
            }
        };

        let forward = self.commands.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if forward.send(Command::Engine { epoch, event }).is_err() {
                    break;
                }
            }
        });

        info!(url = %self.url, "connecting");
        self.engine = Some(engine);
        self.set_status(ClientStatus::Connecting);
    }

    fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Opened { sid, upgrades } => self.on_open(&sid, &upgrades),
            EngineEvent::Message(text) => match Packet::decode(&text) {
                Ok(packet) => self.handle_packet(packet),
                Err(err) => warn!(error = %err, "dropping malformed packet"),
            },
            EngineEvent::Binary(blob) => match self.binary.attach(blob) {
                Ok(Some(packet)) => self.dispatch(packet),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "dropping binary attachment"),
            },
            EngineEvent::Upgraded => {
                self.fire_all(client_event::WEBSOCKET_UPGRADE, Vec::new());
            }
            EngineEvent::Ping => self.fire_all(client_event::PING, Vec::new()),
            EngineEvent::Pong => self.fire_all(client_event::PONG, Vec::new()),
            EngineEvent::Error(message) => {
                self.fire_all(client_event::ERROR, vec![Value::from(message)]);
            }
            EngineEvent::Closed { reason } => self.on_engine_closed(reason),
        }
    }

    fn on_open(&mut self, sid: &str, upgrades: &[String]) {
        info!(sid = %sid, upgrades = ?upgrades, "engine open");
        self.cancel_reconnect();
        self.connect_timer = None;
        self.connect_epoch.advance();
        self.set_status(ClientStatus::Connected);

        self.channel_connected(DEFAULT_PATH);
        let pending: Vec<String> = self
            .channels
            .iter()
            .filter(|(path, c)| c.joined && !c.connected && path.as_str() != DEFAULT_PATH)
            .map(|(path, _)| path.clone())
            .collect();
        for path in pending {
            self.send_packet(&Packet::connect(&path));
        }
    }

    fn on_engine_closed(&mut self, reason: String) {
        self.engine = None;
        info!(reason = %reason, "engine closed");
        if self.current_status() == ClientStatus::Disconnected {
            return;
        }
        if !self.policy.enabled {
            self.did_disconnect(&reason);
            return;
        }
        if !self.reconnect.begin() {
            // A reconnect tick is already scheduled.
            return;
        }
        self.fire_all(client_event::RECONNECT, vec![Value::from(reason.as_str())]);
        self.mark_all_disconnected();
        self.binary.clear();
        self.try_reconnect();
    }

    fn try_reconnect(&mut self) {
        match self.reconnect.next_step(&self.policy) {
            ReconnectStep::Exhausted => {
                warn!(attempts = self.reconnect.attempts(), "reconnect attempts exhausted");
                self.did_disconnect("reconnect failed");
            }
            ReconnectStep::Attempt { remaining } => {
                info!(remaining, "reconnect attempt");
                self.fire_all(client_event::RECONNECT_ATTEMPT, vec![Value::from(remaining)]);
                self.start_connect();
                let epoch = self.reconnect_epoch.advance();
                self.reconnect_timer = Some(schedule_once(
                    self.policy.wait,
                    self.commands.clone(),
                    Command::ReconnectTick { epoch },
                ));
            }
        }
    }

    fn cancel_reconnect(&mut self) {
        self.reconnect.reset();
        self.reconnect_timer = None;
        self.reconnect_epoch.advance();
    }

    fn handle_packet(&mut self, packet: Packet) {
        debug!(path = %packet.path, kind = %packet.kind, id = ?packet.id, "received packet");
        match packet.kind {
            PacketKind::Connect => self.channel_connected(&packet.path),
            PacketKind::Disconnect if packet.path == DEFAULT_PATH => {
                self.did_disconnect("server disconnect");
            }
            PacketKind::Disconnect => self.channel_disconnected(&packet.path, "server disconnect"),
            PacketKind::BinaryEvent | PacketKind::BinaryAck if !packet.is_complete() => {
                self.binary.push(packet);
            }
            _ => self.dispatch(packet),
        }
    }

    fn dispatch(&mut self, packet: Packet) {
        let Packet {
            kind,
            path,
            id,
            mut data,
            ..
        } = packet;
        match kind {
            PacketKind::Event | PacketKind::BinaryEvent => {
                let Some(name) = data.first().and_then(Value::as_str).map(str::to_string) else {
                    warn!(path = %path, "dropping event without a name");
                    return;
                };
                data.remove(0);
                let mut event = Event::new(name, data);
                event.ack = id.map(|id| AckReply::new(self.commands.clone(), path.clone(), id));
                self.fire(&path, event);
            }
            PacketKind::Ack | PacketKind::BinaryAck => match id {
                Some(id) => {
                    if !self.acks.resolve(id, data) {
                        debug!(ack_id = id, "ignoring ack with no pending callback");
                    }
                }
                None => warn!(path = %path, "dropping ack without an id"),
            },
            PacketKind::Error => {
                warn!(path = %path, "server reported an error");
                self.fire(&path, Event::new(client_event::ERROR, data));
            }
            PacketKind::Connect | PacketKind::Disconnect => {}
        }
    }

    fn emit(&mut self, path: String, event: String, items: Vec<Value>, ack: Option<AckRequest>) {
        let connected = self.current_status() == ClientStatus::Connected
            && self.channels.get(&path).is_some_and(|c| c.connected);
        if !connected {
            warn!(path = %path, event = %event, "emit while not connected");
            self.fire(
                &path,
                Event::new(
                    client_event::ERROR,
                    vec![Value::from(format!("tried emitting {event} when not connected"))],
                ),
            );
            return;
        }

        let packet = Packet::event(&path, &event, items, ack.as_ref().map(|a| a.id));
        if let Some(ack) = ack {
            let timer = (!ack.timeout.is_zero()).then(|| {
                schedule_once(
                    ack.timeout,
                    self.commands.clone(),
                    Command::AckTimeout { id: ack.id },
                )
            });
            self.acks.register(ack.id, ack.callback, timer);
        }
        self.send_packet(&packet);
    }

    fn send_packet(&mut self, packet: &Packet) -> bool {
        let Some(engine) = &self.engine else {
            warn!(path = %packet.path, kind = %packet.kind, "no engine to send packet on");
            return false;
        };
        let encoded = match packet.encode() {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(path = %packet.path, error = %err, "failed to encode packet");
                return false;
            }
        };
        debug!(
            path = %packet.path,
            kind = %packet.kind,
            attachments = encoded.attachments.len(),
            "sending packet"
        );
        if let Err(err) = engine.send_message(encoded.text, encoded.attachments) {
            warn!(error = %err, "engine refused packet");
            return false;
        }
        true
    }

    fn join(&mut self, path: String) {
        let channel = self.channels.entry(path.clone()).or_default();
        channel.joined = true;
        let already = channel.connected;
        if path != DEFAULT_PATH && !already && self.current_status() == ClientStatus::Connected {
            self.send_packet(&Packet::connect(&path));
        }
    }

    fn leave(&mut self, path: &str) {
        if path == DEFAULT_PATH {
            self.disconnect();
            return;
        }
        let Some(channel) = self.channels.get_mut(path) else {
            return;
        };
        channel.joined = false;
        if channel.connected {
            self.send_packet(&Packet::disconnect(path));
        }
        self.channel_disconnected(path, "namespace leave");
    }

    fn remove_channel(&mut self, path: &str) {
        if path == DEFAULT_PATH {
            warn!("the root channel cannot be removed");
            return;
        }
        self.leave(path);
        self.channels.remove(path);
    }

    fn disconnect(&mut self) {
        if self.current_status() == ClientStatus::Disconnected {
            return;
        }
        let connected: Vec<String> = self
            .channels
            .iter()
            .filter(|(path, c)| c.connected && path.as_str() != DEFAULT_PATH)
            .map(|(path, _)| path.clone())
            .collect();
        for path in connected {
            self.send_packet(&Packet::disconnect(&path));
        }
        self.did_disconnect("io client disconnect");
    }

    fn did_disconnect(&mut self, reason: &str) {
        info!(reason = %reason, "session disconnected");
        self.cancel_reconnect();
        self.connect_timer = None;
        self.connect_epoch.advance();
        if let Some(engine) = self.engine.take() {
            engine.close(reason);
        }
        self.engine_epoch.advance();
        self.acks.clear();
        self.binary.clear();
        self.set_status(ClientStatus::Disconnected);
        self.mark_all_disconnected();
        self.fire_all(client_event::DISCONNECT, vec![Value::from(reason)]);
    }

    fn channel_connected(&mut self, path: &str) {
        let Some(channel) = self.channels.get_mut(path) else {
            warn!(path = %path, "connect for unknown channel");
            return;
        };
        if channel.connected {
            debug!(path = %path, "channel already connected");
            return;
        }
        channel.connected = true;
        self.connected_paths.send_modify(|paths| {
            paths.insert(path.to_string());
        });
        info!(path = %path, "channel connected");
        self.fire(path, Event::new(client_event::CONNECT, vec![Value::from(path)]));
    }

    fn channel_disconnected(&mut self, path: &str, reason: &str) {
        let Some(channel) = self.channels.get_mut(path) else {
            return;
        };
        if !channel.connected {
            return;
        }
        channel.connected = false;
        self.connected_paths.send_modify(|paths| {
            paths.remove(path);
        });
        info!(path = %path, reason = %reason, "channel disconnected");
        self.fire(path, Event::new(client_event::DISCONNECT, vec![Value::from(reason)]));
    }

    fn mark_all_disconnected(&mut self) {
        for channel in self.channels.values_mut() {
            channel.connected = false;
        }
        self.connected_paths.send_modify(BTreeSet::clear);
    }

    fn fire(&mut self, path: &str, event: Event) {
        let Some(channel) = self.channels.get_mut(path) else {
            return;
        };
        for callback in channel.handlers.take_for(&event.name) {
            callback(&event);
        }
    }

    fn fire_all(&mut self, name: &str, items: Vec<Value>) {
        let paths: Vec<String> = self.channels.keys().cloned().collect();
        for path in paths {
            self.fire(&path, Event::new(name, items.clone()));
        }
    }

    fn shutdown(&mut self) {
        debug!("session task stopping");
        self.cancel_reconnect();
        self.connect_timer = None;
        if let Some(engine) = self.engine.take() {
            engine.close("session dropped");
        }
        self.engine_epoch.advance();
        self.acks.clear();
        self.binary.clear();
    }
}
