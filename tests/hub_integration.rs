//! End-to-end hub scenarios.
//!
//! These tests drive the public `Hub` contract the way the WebSocket layer
//! does: channel-backed transports stand in for live sockets, and every
//! assertion reads actual wire frames.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use collab_hub::config::WebSocketConfig;
use collab_hub::events::NoopEventSink;
use collab_hub::hub::Hub;
use collab_hub::transport::{ChannelTransport, Transport};

struct Client {
    id: Uuid,
    rx: mpsc::Receiver<String>,
}

impl Client {
    async fn connect(hub: &Hub, user: &str, meeting: &str) -> Self {
        let (tx, mut rx) = mpsc::channel(32);
        let transport: Arc<dyn Transport> = Arc::new(ChannelTransport::new(tx));
        let id = hub
            .connect(
                transport,
                Some(user.to_string()),
                Some(format!("meeting_{meeting}")),
            )
            .await;

        // First frame is always the connection acknowledgement.
        let ack: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(ack["type"], "connection_established");
        assert_eq!(ack["connection_id"], id.to_string());

        Self { id, rx }
    }

    fn try_frame(&mut self) -> Option<Value> {
        self.rx.try_recv().ok().map(|text| serde_json::from_str(&text).unwrap())
    }

    fn next_frame(&mut self) -> Value {
        self.try_frame().expect("expected a frame")
    }

    fn assert_silent(&mut self) {
        assert!(self.rx.try_recv().is_err(), "expected no frames");
    }

    fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Some(frame) = self.try_frame() {
            frames.push(frame);
        }
        frames
    }
}

fn new_hub() -> Hub {
    Hub::new(&WebSocketConfig::default(), Arc::new(NoopEventSink))
}

#[tokio::test]
async fn three_member_meeting_scenario() {
    let hub = new_hub();

    // A, B, C join meeting_42 in order.
    let mut a = Client::connect(&hub, "alice", "42").await;

    let mut b = Client::connect(&hub, "bob", "42").await;
    // B's join is announced to A only.
    let joined = a.next_frame();
    assert_eq!(joined["type"], "user_joined");
    assert_eq!(joined["connection_id"], b.id.to_string());
    assert_eq!(joined["user_id"], "bob");
    b.assert_silent();

    let mut c = Client::connect(&hub, "carol", "42").await;
    // C's join reaches both A and B.
    assert_eq!(a.next_frame()["connection_id"], c.id.to_string());
    assert_eq!(b.next_frame()["connection_id"], c.id.to_string());
    c.assert_silent();

    assert_eq!(hub.member_count("meeting_42"), 3);
    assert_eq!(hub.room_count(), 1);

    // A chats; everyone in the room (sender included) gets exactly one frame.
    hub.handle_message(
        a.id,
        r#"{"type":"chat","room_id":"meeting_42","message":"hi"}"#,
    )
    .await;

    let a_id = a.id;
    for client in [&mut a, &mut b, &mut c] {
        let frame = client.next_frame();
        assert_eq!(frame["type"], "chat");
        assert_eq!(frame["message"], "hi");
        assert_eq!(frame["connection_id"], a_id.to_string());
        client.assert_silent();
    }

    // B moves the cursor; only A and C see it.
    hub.handle_message(
        b.id,
        r#"{"type":"cursor","room_id":"meeting_42","position":{"line":1}}"#,
    )
    .await;
    b.assert_silent();
    assert_eq!(a.next_frame()["type"], "cursor");
    assert_eq!(c.next_frame()["type"], "cursor");

    // B leaves; A and C are told.
    hub.disconnect(b.id).await;
    let left = a.next_frame();
    assert_eq!(left["type"], "user_left");
    assert_eq!(left["connection_id"], b.id.to_string());
    assert_eq!(c.next_frame()["type"], "user_left");
    assert_eq!(hub.member_count("meeting_42"), 2);

    // Last two leave; the room disappears entirely.
    hub.disconnect(a.id).await;
    hub.disconnect(c.id).await;
    assert_eq!(hub.room_count(), 0);
    assert_eq!(hub.connection_count(), 0);
}

#[tokio::test]
async fn dead_member_is_reaped_during_broadcast() {
    let hub = new_hub();
    let mut a = Client::connect(&hub, "a", "7").await;
    let b = Client::connect(&hub, "b", "7").await;
    let mut c = Client::connect(&hub, "c", "7").await;
    a.drain();
    c.drain();

    // B's socket dies without a disconnect.
    let b_id = b.id;
    drop(b);

    hub.handle_message(
        a.id,
        r#"{"type":"chat","room_id":"meeting_7","message":"anyone there?"}"#,
    )
    .await;

    assert!(!hub.is_connected(b_id), "dead member evicted from registry");
    assert_eq!(hub.member_count("meeting_7"), 2);
    assert_eq!(a.next_frame()["message"], "anyone there?");
    assert_eq!(c.next_frame()["message"], "anyone there?");
}

#[tokio::test]
async fn heartbeat_evicts_only_silent_connections() {
    // Short interval so two missed cycles fit in test time.
    let config = WebSocketConfig {
        heartbeat_interval: 1,
    };
    let hub = Hub::new(&config, Arc::new(NoopEventSink));

    let mut quiet = Client::connect(&hub, "quiet", "5").await;
    let mut chatty = Client::connect(&hub, "chatty", "5").await;
    quiet.drain();
    chatty.drain();

    // Keep one connection talking past the 2x interval timeout.
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(550)).await;
        hub.handle_message(chatty.id, r#"{"type":"ping"}"#).await;
    }
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert!(!hub.is_connected(quiet.id), "silent connection evicted");
    assert!(hub.is_connected(chatty.id), "active connection survives");

    let frames = chatty.drain();
    assert!(
        frames.iter().any(|f| f["type"] == "heartbeat"),
        "survivor receives heartbeat frames"
    );
    assert!(
        frames.iter().any(|f| f["type"] == "user_left"),
        "survivor is told the silent member left"
    );
    let _ = quiet.drain();
}

#[tokio::test]
async fn server_push_notifies_room_members() {
    let hub = new_hub();
    let mut a = Client::connect(&hub, "a", "3").await;
    let mut b = Client::connect(&hub, "b", "3").await;
    a.drain();
    b.drain();

    // A background job (e.g. transcription) finishing pushes into the room.
    let delivered = hub
        .broadcast(
            "meeting_3",
            serde_json::json!({
                "type": "transcription_complete",
                "payload": {"meeting_id": 3, "segments": 12},
            }),
            &[],
        )
        .await;
    assert_eq!(delivered, 2);

    for client in [&mut a, &mut b] {
        let frame = client.next_frame();
        assert_eq!(frame["type"], "transcription_complete");
        assert_eq!(frame["payload"]["segments"], 12);
    }

    // Direct push to one connection.
    assert!(hub.send(a.id, serde_json::json!({"type": "summary_ready"})).await);
    assert_eq!(a.next_frame()["type"], "summary_ready");
    b.assert_silent();
}

#[tokio::test]
async fn stats_reflect_rooms_and_members() {
    let hub = new_hub();
    let a = Client::connect(&hub, "a", "1").await;
    let _b = Client::connect(&hub, "b", "1").await;
    let _c = Client::connect(&hub, "c", "2").await;

    let stats = hub.stats();
    assert_eq!(stats.connections, 3);
    assert_eq!(stats.rooms, 2);
    assert_eq!(stats.room_sizes["meeting_1"], 2);
    assert_eq!(stats.room_sizes["meeting_2"], 1);

    hub.disconnect(a.id).await;
    let stats = hub.stats();
    assert_eq!(stats.connections, 2);
    assert_eq!(stats.room_sizes["meeting_1"], 1);
}
