use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use sockwire_client::{
    client_event, AckResponse, Channel, ClientError, ClientStatus, Event, Session, SessionConfig,
    Value,
};
use sockwire_frame::encode_payload;
use sockwire_transport::mock::{MockConnector, MockHttp};
use sockwire_transport::Transports;
use tokio::sync::mpsc::{self, UnboundedReceiver};

const OPEN_POLLING_ONLY: &str =
    r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":5000}"#;
const OPEN_WITH_UPGRADE: &str =
    r#"0{"sid":"abc","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":5000}"#;

struct Harness {
    session: Session,
    events: UnboundedReceiver<Event>,
    http: MockHttp,
    sockets: MockConnector,
}

fn start(config: SessionConfig, http: MockHttp, sockets: MockConnector) -> Harness {
    let transports = Transports::new(Arc::new(http.clone()), Arc::new(sockets.clone()));
    let session =
        Session::new("http://localhost:3000", config, transports).expect("session should start");
    let events = record(&session.default_channel());
    Harness {
        session,
        events,
        http,
        sockets,
    }
}

fn start_default() -> Harness {
    start(SessionConfig::default(), MockHttp::new(), MockConnector::new())
}

async fn connected(config: SessionConfig) -> Harness {
    let mut h = start(config, MockHttp::new(), MockConnector::new());
    h.session.connect().unwrap();
    h.http.push_packets(&[OPEN_POLLING_ONLY]);
    h.session.wait_until_connected().await.unwrap();
    next_named(&mut h.events, client_event::CONNECT).await;
    h
}

/// Forward every event delivered to `channel` into a queue.
fn record(channel: &Channel) -> UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    channel.on_any(move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}

async fn next_named(events: &mut UnboundedReceiver<Event>, name: &str) -> Event {
    let wait = async {
        loop {
            let event = events.recv().await.expect("session should deliver events");
            if event.name == name {
                return event;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(120), wait)
        .await
        .unwrap_or_else(|_| panic!("no {name:?} event"))
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

async fn next_post(http: &MockHttp) -> String {
    http.next_post().await.expect("a POST should arrive")
}

#[tokio::test(start_paused = true)]
async fn default_channel_receives_events() {
    let mut h = start_default();
    h.session.connect().unwrap();
    h.http.push_packets(&[OPEN_POLLING_ONLY, "40"]);
    h.http.push_packets(&[r#"42["chat","hi",{"n":1}]"#]);

    let mut seen = Vec::new();
    let chat = loop {
        let event = h.events.recv().await.unwrap();
        if event.name == "chat" {
            break event;
        }
        seen.push(event);
    };

    assert_eq!(
        chat.items,
        vec![Value::from("hi"), Value::from(json!({"n": 1}))]
    );
    assert!(chat.ack.is_none());

    let connects: Vec<_> = seen
        .iter()
        .filter(|e| e.name == client_event::CONNECT)
        .collect();
    assert_eq!(connects.len(), 1, "a repeated root connect is ignored");
    assert_eq!(connects[0].items, vec![Value::from("/")]);

    let statuses: Vec<_> = seen
        .iter()
        .filter(|e| e.name == client_event::STATUS_CHANGE)
        .map(|e| e.items[0].clone())
        .collect();
    assert_eq!(
        statuses,
        vec![Value::from("connecting"), Value::from("connected")]
    );
    assert_eq!(h.session.status(), ClientStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn emit_posts_event_frame() {
    let h = connected(SessionConfig::default()).await;
    h.session.emit("chat", vec![Value::from("hi")]).unwrap();
    assert_eq!(
        next_post(&h.http).await,
        encode_payload(&[r#"42["chat","hi"]"#])
    );
}

#[tokio::test(start_paused = true)]
async fn ack_round_trip_ignores_duplicates() {
    let h = connected(SessionConfig::default()).await;
    let (tx, mut replies) = mpsc::unbounded_channel();

    let emitter = h
        .session
        .emit_with_ack("sum", vec![Value::from(1i64), Value::from(2i64)]);
    assert_eq!(emitter.id(), 0);
    emitter.timing_out_after(Duration::ZERO, move |response| {
        let _ = tx.send(response);
    });
    assert_eq!(
        next_post(&h.http).await,
        encode_payload(&[r#"420["sum",1,2]"#])
    );

    h.http.push_packets(&["430[3]", "430[4]"]);
    assert_eq!(
        replies.recv().await,
        Some(AckResponse::Ack(vec![Value::from(3i64)]))
    );
    settle().await;
    assert!(replies.try_recv().is_err());
    assert_eq!(h.session.status(), ClientStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn ack_timeout_then_late_reply_is_ignored() {
    let h = connected(SessionConfig::default()).await;

    let result = h
        .session
        .emit_with_ack("slow", Vec::new())
        .response(Duration::from_secs(5))
        .await;
    assert!(matches!(
        result,
        Err(ClientError::AckTimeout(timeout)) if timeout == Duration::from_secs(5)
    ));
    assert_eq!(next_post(&h.http).await, encode_payload(&[r#"420["slow"]"#]));

    let pending = tokio::spawn(
        h.session
            .emit_with_ack("fast", Vec::new())
            .response(Duration::from_secs(5)),
    );
    assert_eq!(next_post(&h.http).await, encode_payload(&[r#"421["fast"]"#]));
    h.http.push_packets(&["430[]", r#"431["done"]"#]);
    assert_eq!(pending.await.unwrap().unwrap(), vec![Value::from("done")]);
}

#[tokio::test(start_paused = true)]
async fn binary_events_are_reassembled_and_sent() {
    let mut h = connected(SessionConfig::default()).await;

    h.http.push_packets(&[
        r#"451-["file",{"_placeholder":true,"num":0}]"#,
        "b4AQID",
    ]);
    let file = next_named(&mut h.events, "file").await;
    assert_eq!(file.items, vec![Value::Binary(Bytes::from_static(&[1, 2, 3]))]);

    h.session
        .emit("upload", vec![Value::from(vec![1u8, 2, 3])])
        .unwrap();
    assert_eq!(
        next_post(&h.http).await,
        encode_payload(&[
            r#"451-["upload",{"_placeholder":true,"num":0}]"#,
            "b4AQID"
        ])
    );
}

#[tokio::test(start_paused = true)]
async fn reconnect_gives_up_after_max_attempts() {
    let config = SessionConfig::default()
        .with_reconnect_attempts(Some(3))
        .with_reconnect_wait(Duration::from_secs(1));
    let mut h = start(config, MockHttp::refusing(), MockConnector::new());
    h.session.connect().unwrap();

    let mut attempts = Vec::new();
    let disconnect = loop {
        let event = h.events.recv().await.unwrap();
        match event.name.as_str() {
            client_event::RECONNECT_ATTEMPT => attempts.push(event.items[0].clone()),
            client_event::DISCONNECT => break event,
            _ => {}
        }
    };

    assert_eq!(
        attempts,
        vec![Value::from(3i64), Value::from(2i64), Value::from(1i64)]
    );
    assert_eq!(disconnect.items, vec![Value::from("reconnect failed")]);
    assert_eq!(h.http.get_count(), 4, "initial connect plus three attempts");
    assert_eq!(h.session.status(), ClientStatus::Disconnected);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.http.get_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn hung_reconnect_attempts_each_start_a_new_handshake() {
    let config = SessionConfig::default()
        .with_reconnect_attempts(Some(3))
        .with_reconnect_wait(Duration::from_secs(1));
    let mut h = connected(config).await;
    settle().await;
    let gets_before = h.http.get_count();

    // Drop the transport; every later poll hangs without a reply.
    h.http.push_status(500);
    let mut attempts = Vec::new();
    let disconnect = loop {
        let event = h.events.recv().await.unwrap();
        match event.name.as_str() {
            client_event::RECONNECT_ATTEMPT => attempts.push(event.items[0].clone()),
            client_event::DISCONNECT => break event,
            _ => {}
        }
    };

    assert_eq!(
        attempts,
        vec![Value::from(3i64), Value::from(2i64), Value::from(1i64)]
    );
    assert_eq!(disconnect.items, vec![Value::from("reconnect failed")]);
    assert_eq!(
        h.http.get_count() - gets_before,
        3,
        "one handshake per attempt"
    );
}

#[tokio::test(start_paused = true)]
async fn failed_handshake_reports_error_and_reconnects() {
    let mut h = start_default();
    h.session.connect().unwrap();
    h.http.push_packets(&[r#"0{"upgrades":[]}"#]);

    let error = next_named(&mut h.events, client_event::ERROR).await;
    let message = error.items[0].as_str().unwrap_or_default().to_string();
    assert!(message.contains("session id"), "error: {message}");

    let reconnect = next_named(&mut h.events, client_event::RECONNECT).await;
    assert_eq!(reconnect.items, vec![Value::from(message.as_str())]);
    let attempt = next_named(&mut h.events, client_event::RECONNECT_ATTEMPT).await;
    assert_eq!(attempt.items, vec![Value::from(-1i64)]);
    assert_eq!(h.session.status(), ClientStatus::Connecting);

    h.http.push_packets(&[OPEN_POLLING_ONLY]);
    let connect = next_named(&mut h.events, client_event::CONNECT).await;
    assert_eq!(connect.items, vec![Value::from("/")]);
    assert_eq!(h.session.status(), ClientStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn user_disconnect_suppresses_reconnect() {
    let mut h = connected(SessionConfig::default()).await;

    h.session.disconnect().unwrap();
    let disconnect = next_named(&mut h.events, client_event::DISCONNECT).await;
    assert_eq!(disconnect.items, vec![Value::from("io client disconnect")]);
    assert_eq!(next_post(&h.http).await, encode_payload(&["1"]));

    let gets = h.http.get_count();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.http.get_count(), gets);
    assert_eq!(h.session.status(), ClientStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn transport_error_reconnects_and_recovers() {
    let mut h = connected(SessionConfig::default()).await;

    h.http.push_status(500);
    let reconnect = next_named(&mut h.events, client_event::RECONNECT).await;
    assert_eq!(
        reconnect.items,
        vec![Value::from("poll failed with http status 500")]
    );
    let attempt = next_named(&mut h.events, client_event::RECONNECT_ATTEMPT).await;
    assert_eq!(attempt.items, vec![Value::from(-1i64)]);

    h.http.push_packets(&[OPEN_POLLING_ONLY]);
    let connect = next_named(&mut h.events, client_event::CONNECT).await;
    assert_eq!(connect.items, vec![Value::from("/")]);
    assert_eq!(h.session.status(), ClientStatus::Connected);

    h.session.emit("back", Vec::new()).unwrap();
    assert_eq!(next_post(&h.http).await, encode_payload(&[r#"42["back"]"#]));
}

#[tokio::test(start_paused = true)]
async fn upgrade_moves_emits_to_the_socket() {
    let mut h = start_default();
    h.session.connect().unwrap();
    h.http.push_packets(&[OPEN_WITH_UPGRADE]);

    let mut peer = h.sockets.accept().await.expect("probe socket");
    assert!(peer.request.url.starts_with("ws://localhost:3000/socket.io/"));
    assert!(peer.request.url.contains("transport=websocket"));
    assert!(peer.request.url.contains("sid=abc"));
    assert_eq!(peer.next_text().await.as_deref(), Some("2probe"));
    peer.send_text("3probe");
    assert_eq!(peer.next_text().await.as_deref(), Some("5"));
    next_named(&mut h.events, client_event::WEBSOCKET_UPGRADE).await;

    h.session.emit("chat", vec![Value::from("hi")]).unwrap();
    assert_eq!(
        peer.next_text().await.as_deref(),
        Some(r#"42["chat","hi"]"#)
    );

    peer.send_text(r#"42["reply","x"]"#);
    let event = next_named(&mut h.events, "reply").await;
    assert_eq!(event.items, vec![Value::from("x")]);
}

#[tokio::test(start_paused = true)]
async fn server_event_can_be_acknowledged_once() {
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let mut h = start_default();
    {
        let outcomes = outcomes.clone();
        h.session.on("question", move |event| {
            let mut outcomes = outcomes.lock().unwrap();
            outcomes.push(event.reply(vec![Value::from("yes")]));
            outcomes.push(event.reply(vec![Value::from("no")]));
        });
    }
    h.session.connect().unwrap();
    h.http.push_packets(&[OPEN_POLLING_ONLY, r#"421["question"]"#]);

    next_named(&mut h.events, "question").await;
    assert_eq!(next_post(&h.http).await, encode_payload(&[r#"431["yes"]"#]));
    assert_eq!(*outcomes.lock().unwrap(), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn emit_while_disconnected_reports_error() {
    let mut h = start_default();
    h.session.emit("chat", Vec::new()).unwrap();

    let error = next_named(&mut h.events, client_event::ERROR).await;
    assert_eq!(
        error.items,
        vec![Value::from("tried emitting chat when not connected")]
    );

    let result = h
        .session
        .emit_with_ack("chat", Vec::new())
        .response(Duration::from_secs(1))
        .await;
    assert!(matches!(result, Err(ClientError::AckDropped)));
    assert_eq!(h.http.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn joined_channel_connects_and_disconnects_alone() {
    let h = start_default();
    let admin = h.session.channel("admin");
    assert_eq!(admin.path(), "/admin");
    let mut admin_events = record(&admin);
    admin.join().unwrap();

    h.session.connect().unwrap();
    h.http.push_packets(&[OPEN_POLLING_ONLY]);
    assert_eq!(next_post(&h.http).await, encode_payload(&["40/admin,"]));

    h.http.push_packets(&["40/admin,"]);
    let connect = next_named(&mut admin_events, client_event::CONNECT).await;
    assert_eq!(connect.items, vec![Value::from("/admin")]);
    assert!(admin.is_connected());

    admin.emit("hi", Vec::new()).unwrap();
    assert_eq!(
        next_post(&h.http).await,
        encode_payload(&[r#"42/admin,["hi"]"#])
    );

    h.http.push_packets(&["41/admin,"]);
    let disconnect = next_named(&mut admin_events, client_event::DISCONNECT).await;
    assert_eq!(disconnect.items, vec![Value::from("server disconnect")]);
    assert!(!admin.is_connected());
    assert!(h.session.default_channel().is_connected());
    assert_eq!(h.session.status(), ClientStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn leaving_a_channel_sends_disconnect() {
    let h = connected(SessionConfig::default()).await;
    let admin = h.session.channel("/admin");
    let mut admin_events = record(&admin);
    admin.join().unwrap();
    assert_eq!(next_post(&h.http).await, encode_payload(&["40/admin,"]));
    h.http.push_packets(&["40/admin,"]);
    next_named(&mut admin_events, client_event::CONNECT).await;

    h.session.remove_channel("/admin").unwrap();
    let leave = next_named(&mut admin_events, client_event::DISCONNECT).await;
    assert_eq!(leave.items, vec![Value::from("namespace leave")]);
    assert_eq!(next_post(&h.http).await, encode_payload(&["41/admin,"]));
}

#[tokio::test(start_paused = true)]
async fn server_disconnect_of_root_is_final() {
    let mut h = connected(SessionConfig::default()).await;
    h.http.push_packets(&["41"]);

    let disconnect = next_named(&mut h.events, client_event::DISCONNECT).await;
    assert_eq!(disconnect.items, vec![Value::from("server disconnect")]);
    assert_eq!(h.session.status(), ClientStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_disconnects() {
    let config = SessionConfig::default().with_connect_timeout(Duration::from_secs(2));
    let mut h = start(config, MockHttp::new(), MockConnector::new());
    h.session.connect().unwrap();

    let error = next_named(&mut h.events, client_event::ERROR).await;
    assert_eq!(error.items, vec![Value::from("connect timeout")]);
    let disconnect = next_named(&mut h.events, client_event::DISCONNECT).await;
    assert_eq!(disconnect.items, vec![Value::from("connect timeout")]);
    assert!(matches!(
        h.session.wait_until_connected().await,
        Err(ClientError::Disconnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_session_drops_pending_acks() {
    let Harness { session, http, .. } = connected(SessionConfig::default()).await;

    let pending = tokio::spawn(
        session
            .emit_with_ack("forever", Vec::new())
            .response(Duration::ZERO),
    );
    assert_eq!(next_post(&http).await, encode_payload(&[r#"420["forever"]"#]));

    drop(session);
    assert!(matches!(
        pending.await.unwrap(),
        Err(ClientError::AckDropped)
    ));
    assert_eq!(next_post(&http).await, encode_payload(&["1"]));
}
