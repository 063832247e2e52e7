use bytes::Bytes;
use sockwire_frame::{
    decode_engine_text, decode_payload, encode_base64_binary, encode_payload, strip_binary_marker,
    with_binary_marker, EngineMessage, EnginePacket, EnginePacketKind,
};
use sockwire_transport::{
    HttpMethod, HttpRequest, HttpResponse, SocketEvent, SocketFrame, SocketLink, SocketRequest,
    Transports,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::endpoint::EngineUrls;
use crate::error::{EngineError, Result};
use crate::handshake::OpenInfo;
use crate::heartbeat::{Heartbeat, HeartbeatTick};
use crate::state::TransportState;
use crate::timer::{schedule_once, schedule_repeating, Epoch, ScheduledTask};

/// Everything the engine reports, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Handshake complete.
    Opened { sid: String, upgrades: Vec<String> },
    /// Data of an inbound `message` packet.
    Message(String),
    /// An inbound binary message (already unwrapped from base64 or the
    /// socket marker byte).
    Binary(Bytes),
    /// The streaming socket is now the primary transport.
    Upgraded,
    /// A heartbeat ping was sent.
    Ping,
    /// A heartbeat pong arrived.
    Pong,
    /// A transport or handshake failure. Always followed by `Closed`.
    Error(String),
    /// The engine stopped. No further events follow.
    Closed { reason: String },
}

#[derive(Debug)]
enum Command {
    Write {
        kind: EnginePacketKind,
        data: String,
        attachments: Vec<Bytes>,
    },
    Close {
        reason: String,
    },
}

/// Cheap handle for driving a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<TransportState>,
}

impl EngineHandle {
    /// Queue an engine packet followed by its binary attachments.
    pub fn write(
        &self,
        data: impl Into<String>,
        kind: EnginePacketKind,
        attachments: Vec<Bytes>,
    ) -> Result<()> {
        self.commands
            .send(Command::Write {
                kind,
                data: data.into(),
                attachments,
            })
            .map_err(|_| EngineError::Closed)
    }

    /// Queue a `message` packet.
    pub fn send_message(&self, data: impl Into<String>, attachments: Vec<Bytes>) -> Result<()> {
        self.write(data, EnginePacketKind::Message, attachments)
    }

    /// Close the engine, telling the server if a handshake completed.
    pub fn close(&self, reason: impl Into<String>) {
        let _ = self.commands.send(Command::Close {
            reason: reason.into(),
        });
    }

    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    /// Watch transport state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<TransportState> {
        self.state.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed() || self.state() == TransportState::Closed
    }
}

/// Entry point for starting engines.
#[derive(Debug)]
pub struct Engine;

impl Engine {
    /// Start an engine task for `server` and begin the handshake.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        server: &str,
        config: EngineConfig,
        transports: Transports,
    ) -> Result<(EngineHandle, mpsc::UnboundedReceiver<EngineEvent>)> {
        let urls = EngineUrls::new(server, &config)?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(TransportState::Idle);

        let task = EngineTask {
            headers: config.request_headers(),
            config,
            urls,
            transports,
            events: events_tx,
            internal: internal_tx,
            state: state_tx,
            sid: None,
            heartbeat: None,
            ping_timer: None,
            probe_timer: None,
            poll_in_flight: false,
            post_in_flight: false,
            post_queue: Vec::new(),
            probe_wait: Vec::new(),
            probing: false,
            socket: None,
            socket_primary: false,
            socket_epoch: Epoch::new(),
            closed: false,
        };
        tokio::spawn(task.run(commands_rx, internal_rx));

        Ok((
            EngineHandle {
                commands: commands_tx,
                state: state_rx,
            },
            events_rx,
        ))
    }
}

/// Completions and timer firings delivered back onto the engine task.
#[derive(Debug)]
enum Internal {
    PollDone(sockwire_transport::Result<HttpResponse>),
    PostDone(sockwire_transport::Result<HttpResponse>),
    SocketOpened {
        generation: u64,
        result: sockwire_transport::Result<SocketLink>,
    },
    Socket {
        generation: u64,
        event: SocketEvent,
    },
    PingTick,
    ProbeTimeout {
        generation: u64,
    },
}

#[derive(Debug, Clone)]
enum Outbound {
    Text(String),
    Binary(Bytes),
}

impl Outbound {
    fn into_poll_text(self) -> String {
        match self {
            Outbound::Text(text) => text,
            Outbound::Binary(blob) => encode_base64_binary(&blob),
        }
    }

    fn into_socket_frame(self) -> SocketFrame {
        match self {
            Outbound::Text(text) => SocketFrame::Text(text),
            Outbound::Binary(blob) => SocketFrame::Binary(with_binary_marker(&blob)),
        }
    }
}

#[derive(Debug)]
struct SocketHandle {
    generation: u64,
    outbound: mpsc::UnboundedSender<SocketFrame>,
}

struct EngineTask {
    config: EngineConfig,
    urls: EngineUrls,
    headers: Vec<(String, String)>,
    transports: Transports,
    events: mpsc::UnboundedSender<EngineEvent>,
    internal: mpsc::UnboundedSender<Internal>,
    state: watch::Sender<TransportState>,
    sid: Option<String>,
    heartbeat: Option<Heartbeat>,
    ping_timer: Option<ScheduledTask>,
    probe_timer: Option<ScheduledTask>,
    poll_in_flight: bool,
    post_in_flight: bool,
    /// Encoded packets waiting for the next POST.
    post_queue: Vec<String>,
    /// Packets written while a probe is in progress.
    probe_wait: Vec<Outbound>,
    probing: bool,
    socket: Option<SocketHandle>,
    socket_primary: bool,
    socket_epoch: Epoch,
    closed: bool,
}

impl EngineTask {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        self.start();
        while !self.closed {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => self.close("engine handle dropped", true),
                },
                Some(message) = internal.recv() => self.handle_internal(message),
            }
        }
        debug!("engine task stopped");
    }

    fn start(&mut self) {
        self.set_state(TransportState::Handshaking);
        if self.config.force_websockets {
            info!("handshaking over streaming socket");
            self.socket_primary = true;
            self.open_socket();
        } else {
            info!("handshaking over long-polling");
            self.start_poll();
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Write {
                kind,
                data,
                attachments,
            } => {
                let mut items = Vec::with_capacity(attachments.len() + 1);
                items.push(Outbound::Text(EnginePacket::new(kind, data).encode()));
                items.extend(attachments.into_iter().map(Outbound::Binary));
                self.write(items);
            }
            Command::Close { reason } => self.close(&reason, true),
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::PollDone(result) => self.on_poll(result),
            Internal::PostDone(result) => self.on_post(result),
            Internal::SocketOpened { generation, result } => {
                self.on_socket_opened(generation, result)
            }
            Internal::Socket { generation, event } => {
                if self.socket_epoch.is_current(generation) {
                    self.on_socket_event(event);
                }
            }
            Internal::PingTick => self.on_ping_tick(),
            Internal::ProbeTimeout { generation } => {
                if self.probing && self.socket_epoch.is_current(generation) {
                    self.abort_probe("probe timed out");
                }
            }
        }
    }

    // Polling

    fn start_poll(&mut self) {
        if self.poll_in_flight || self.closed || self.socket_primary {
            return;
        }
        self.poll_in_flight = true;
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: self.urls.polling(self.sid.as_deref()),
            headers: self.headers.clone(),
            body: None,
        };
        let http = self.transports.http.clone();
        let internal = self.internal.clone();
        tokio::spawn(async move {
            let result = http.request(request).await;
            let _ = internal.send(Internal::PollDone(result));
        });
    }

    fn on_poll(&mut self, result: sockwire_transport::Result<HttpResponse>) {
        self.poll_in_flight = false;
        let response = match result {
            Ok(response) if response.is_success() => response,
            // The last poll of an upgraded session may fail as the server drops it.
            Ok(_) | Err(_) if self.socket_primary => {
                debug!("ignoring failed poll after upgrade");
                return;
            }
            Ok(response) => {
                return self.fail(format!("poll failed with http status {}", response.status))
            }
            Err(err) => return self.fail(format!("poll failed: {err}")),
        };

        let body = String::from_utf8_lossy(&response.body);
        match decode_payload(&body) {
            Ok(packets) => {
                for packet in packets {
                    self.handle_text(&packet);
                    if self.closed {
                        return;
                    }
                }
            }
            Err(err) => warn!(error = %err, "dropping malformed poll payload"),
        }

        if self.sid.is_none() {
            return self.fail("handshake response carried no open packet".to_string());
        }
        self.start_poll();
    }

    fn flush_posts(&mut self) {
        if self.post_in_flight
            || self.post_queue.is_empty()
            || self.sid.is_none()
            || self.socket_primary
            || self.closed
        {
            return;
        }
        let packets = std::mem::take(&mut self.post_queue);
        debug!(packets = packets.len(), "posting");
        self.post_in_flight = true;
        let request = self.post_request(encode_payload(&packets));
        let http = self.transports.http.clone();
        let internal = self.internal.clone();
        tokio::spawn(async move {
            let result = http.request(request).await;
            let _ = internal.send(Internal::PostDone(result));
        });
    }

    fn post_request(&self, body: String) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Post,
            url: self.urls.polling(self.sid.as_deref()),
            headers: self.headers.clone(),
            body: Some(Bytes::from(body)),
        }
    }

    fn on_post(&mut self, result: sockwire_transport::Result<HttpResponse>) {
        self.post_in_flight = false;
        match result {
            Ok(response) if response.is_success() => self.flush_posts(),
            _ if self.socket_primary => debug!("ignoring failed post after upgrade"),
            Ok(response) => self.fail(format!("post failed with http status {}", response.status)),
            Err(err) => self.fail(format!("post failed: {err}")),
        }
    }

    // Streaming socket

    fn open_socket(&mut self) {
        let generation = self.socket_epoch.advance();
        let request = SocketRequest {
            url: self.urls.websocket(self.sid.as_deref()),
            headers: self.headers.clone(),
            compress: self.config.compress,
        };
        let connector = self.transports.socket.clone();
        let internal = self.internal.clone();
        tokio::spawn(async move {
            let result = connector.connect(request).await;
            let _ = internal.send(Internal::SocketOpened { generation, result });
        });
    }

    fn on_socket_opened(
        &mut self,
        generation: u64,
        result: sockwire_transport::Result<SocketLink>,
    ) {
        if self.closed || !self.socket_epoch.is_current(generation) {
            return;
        }
        let link = match result {
            Ok(link) => link,
            Err(err) if self.socket_primary => {
                return self.fail(format!("streaming socket failed: {err}"));
            }
            Err(err) => {
                debug!(error = %err, "probe socket failed to open");
                return self.abort_probe("probe socket failed to open");
            }
        };

        let SocketLink {
            outbound,
            mut inbound,
        } = link;
        let internal = self.internal.clone();
        tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                if internal.send(Internal::Socket { generation, event }).is_err() {
                    break;
                }
            }
        });

        if self.probing {
            debug!("probe socket open, sending probe ping");
            let _ = outbound.send(SocketFrame::Text(
                EnginePacket::new(EnginePacketKind::Ping, "probe").encode(),
            ));
        }
        self.socket = Some(SocketHandle {
            generation,
            outbound: outbound.clone(),
        });
        if self.socket_primary && !self.probe_wait.is_empty() {
            let waiting = std::mem::take(&mut self.probe_wait);
            self.send_frames(&outbound, waiting);
        }
    }

    fn on_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Text(text) if self.socket_primary => self.handle_text(&text),
            SocketEvent::Text(text) => {
                if self.probing && text == "3probe" {
                    self.complete_upgrade();
                } else {
                    debug!(%text, "ignoring text on probe socket");
                }
            }
            SocketEvent::Binary(data) if self.socket_primary => {
                self.emit(EngineEvent::Binary(strip_binary_marker(data)));
            }
            SocketEvent::Binary(_) => debug!("ignoring binary on probe socket"),
            SocketEvent::Closed { code, reason } if self.socket_primary => {
                self.fail(format!("streaming socket closed ({code}) {reason}"));
            }
            SocketEvent::Error(err) if self.socket_primary => {
                self.fail(format!("streaming socket error: {err}"));
            }
            SocketEvent::Closed { .. } | SocketEvent::Error(_) => {
                self.abort_probe("probe socket closed");
            }
        }
    }

    fn start_probe(&mut self, deadline: std::time::Duration) {
        self.probing = true;
        self.set_state(TransportState::Probing);
        self.open_socket();
        self.probe_timer = Some(schedule_once(
            deadline,
            self.internal.clone(),
            Internal::ProbeTimeout {
                generation: self.socket_epoch.current(),
            },
        ));
        info!("probing streaming socket");
    }

    fn complete_upgrade(&mut self) {
        let Some(outbound) = self.socket.as_ref().map(|s| s.outbound.clone()) else {
            return;
        };
        info!("probe succeeded, upgrading to streaming socket");
        self.set_state(TransportState::Upgrading);
        self.probe_timer = None;
        self.probing = false;
        self.socket_primary = true;

        let mut frames = vec![SocketFrame::Text(
            EnginePacket::new(EnginePacketKind::Upgrade, "").encode(),
        )];
        frames.extend(self.post_queue.drain(..).map(SocketFrame::Text));
        frames.extend(self.probe_wait.drain(..).map(Outbound::into_socket_frame));
        for frame in frames {
            if outbound.send(frame).is_err() {
                return self.fail("streaming socket closed during upgrade".to_string());
            }
        }

        self.set_state(TransportState::Streaming);
        self.emit(EngineEvent::Upgraded);
    }

    fn abort_probe(&mut self, reason: &str) {
        if !self.probing {
            return;
        }
        debug!(reason, "abandoning probe, staying on long-polling");
        self.probing = false;
        self.probe_timer = None;
        if let Some(socket) = self.socket.take() {
            let _ = socket.outbound.send(SocketFrame::Close);
        }
        self.socket_epoch.advance();
        self.set_state(TransportState::Polling);
        let waiting = std::mem::take(&mut self.probe_wait);
        self.post_queue
            .extend(waiting.into_iter().map(Outbound::into_poll_text));
        self.flush_posts();
    }

    // Packets

    fn handle_text(&mut self, text: &str) {
        let packet = match decode_engine_text(text) {
            Ok(EngineMessage::Binary(blob)) => return self.emit(EngineEvent::Binary(blob)),
            Ok(EngineMessage::Packet(packet)) => packet,
            Err(err) => {
                warn!(error = %err, "dropping malformed engine packet");
                return;
            }
        };

        match packet.kind {
            EnginePacketKind::Open => self.on_open(&packet.data),
            EnginePacketKind::Close => {
                info!("server closed the engine");
                self.close("server closed", false);
            }
            EnginePacketKind::Ping => {
                self.write(vec![Outbound::Text(
                    EnginePacket::new(EnginePacketKind::Pong, packet.data).encode(),
                )]);
            }
            EnginePacketKind::Pong => {
                if let Some(heartbeat) = &mut self.heartbeat {
                    heartbeat.pong();
                }
                self.emit(EngineEvent::Pong);
            }
            EnginePacketKind::Message => self.emit(EngineEvent::Message(packet.data)),
            EnginePacketKind::Upgrade | EnginePacketKind::Noop => {}
        }
    }

    fn on_open(&mut self, data: &str) {
        if self.sid.is_some() {
            warn!("ignoring repeated open packet");
            return;
        }
        let open = match OpenInfo::parse(data) {
            Ok(open) => open,
            Err(err) => return self.fail(err.to_string()),
        };
        info!(sid = %open.sid, upgrades = ?open.upgrades, "engine open");

        let heartbeat = Heartbeat::new(open.ping_interval, open.ping_timeout);
        self.ping_timer = Some(schedule_repeating(
            heartbeat.interval(),
            self.internal.clone(),
            || Internal::PingTick,
        ));
        self.heartbeat = Some(heartbeat);
        self.sid = Some(open.sid.clone());
        self.set_state(if self.socket_primary {
            TransportState::Streaming
        } else {
            TransportState::Polling
        });
        self.emit(EngineEvent::Opened {
            sid: open.sid.clone(),
            upgrades: open.upgrades.clone(),
        });

        if !self.socket_primary && !self.config.force_polling && open.offers_websocket() {
            self.start_probe(open.ping_interval + open.ping_timeout);
        }
        self.flush_posts();
    }

    fn on_ping_tick(&mut self) {
        let Some(heartbeat) = &mut self.heartbeat else {
            return;
        };
        match heartbeat.tick() {
            HeartbeatTick::TimedOut => {
                warn!(missed = heartbeat.missed(), "no pong from server");
                self.close("ping timeout", false);
            }
            HeartbeatTick::SendPing => {
                self.write(vec![Outbound::Text(
                    EnginePacket::new(EnginePacketKind::Ping, "").encode(),
                )]);
                self.emit(EngineEvent::Ping);
            }
        }
    }

    fn write(&mut self, items: Vec<Outbound>) {
        if self.closed {
            debug!("dropping write on closed engine");
            return;
        }
        if self.socket_primary {
            match self.socket.as_ref().map(|s| s.outbound.clone()) {
                Some(outbound) => self.send_frames(&outbound, items),
                // Forced streaming socket not connected yet.
                None => self.probe_wait.extend(items),
            }
            return;
        }
        if self.probing {
            self.probe_wait.extend(items);
            return;
        }
        self.post_queue
            .extend(items.into_iter().map(Outbound::into_poll_text));
        self.flush_posts();
    }

    fn send_frames(&mut self, outbound: &mpsc::UnboundedSender<SocketFrame>, items: Vec<Outbound>) {
        for item in items {
            if outbound.send(item.into_socket_frame()).is_err() {
                return self.fail("streaming socket closed".to_string());
            }
        }
    }

    // Shutdown

    fn fail(&mut self, message: String) {
        if self.closed {
            return;
        }
        warn!(error = %message, "engine transport error");
        self.emit(EngineEvent::Error(message.clone()));
        self.close(&message, false);
    }

    fn close(&mut self, reason: &str, notify_server: bool) {
        if self.closed {
            return;
        }
        let close_packet = EnginePacket::new(EnginePacketKind::Close, "").encode();
        if notify_server && self.sid.is_some() {
            if self.socket_primary {
                if let Some(socket) = &self.socket {
                    let _ = socket.outbound.send(SocketFrame::Text(close_packet));
                }
            } else {
                // Packets still queued go out ahead of the close packet.
                let mut packets = std::mem::take(&mut self.post_queue);
                packets.push(close_packet);
                let request = self.post_request(encode_payload(&packets));
                let http = self.transports.http.clone();
                tokio::spawn(async move {
                    if let Err(err) = http.request(request).await {
                        debug!(error = %err, "close packet not delivered");
                    }
                });
            }
        }
        if let Some(socket) = self.socket.take() {
            debug!(generation = socket.generation, "closing streaming socket");
            let _ = socket.outbound.send(SocketFrame::Close);
        }
        self.socket_epoch.advance();
        self.ping_timer = None;
        self.probe_timer = None;
        self.probing = false;
        self.post_queue.clear();
        self.probe_wait.clear();
        self.closed = true;
        self.set_state(TransportState::Closed);
        info!(reason, "engine closed");
        self.emit(EngineEvent::Closed {
            reason: reason.to_string(),
        });
    }

    fn set_state(&self, state: TransportState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}
