// Integration tests for `Connection` against an in-memory gateway.
#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use lamp_api::memory::{GatewayPeer, MemoryConnector};
use lamp_core::{
    BridgeConfig, Connection, CoreError, Credentials, DailyReconnect, Notifier, NotifyTarget,
};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ── Helpers ─────────────────────────────────────────────────────────

struct ChannelNotifier(mpsc::UnboundedSender<()>);

impl Notifier for ChannelNotifier {
    fn notify(&self) -> BoxFuture<'_, ()> {
        let _ = self.0.send(());
        Box::pin(async {})
    }
}

fn config(channels: i64) -> BridgeConfig {
    let mut config = BridgeConfig::from_setup(
        Credentials {
            host: "eg2s.test".into(),
            username: "admin".into(),
            password: SecretString::from("secret".to_string()),
        },
        NotifyTarget {
            host: "ha.test".into(),
            token: SecretString::from("lamps".to_string()),
        },
        channels,
        -1,
    )
    .unwrap();
    config.timing.query_timeout = Duration::from_secs(2);
    config
}

struct Harness {
    connector: Arc<MemoryConnector>,
    connection: Arc<Connection>,
    notified: mpsc::UnboundedReceiver<()>,
}

fn harness(channels: i64) -> Harness {
    let connector = Arc::new(MemoryConnector::new());
    let (tx, notified) = mpsc::unbounded_channel();
    let connection = Arc::new(Connection::new(
        config(channels),
        connector.clone(),
        Arc::new(ChannelNotifier(tx)),
    ));
    Harness {
        connector,
        connection,
        notified,
    }
}

/// Connect and return the gateway side with the handshake drained.
async fn connect(h: &Harness) -> GatewayPeer {
    let (result, mut peer) = tokio::join!(h.connection.connect(), h.connector.accept());
    result.unwrap();
    assert_eq!(peer.next_frame().await.unwrap()["method"], "LogIn");
    assert_eq!(peer.next_frame().await.unwrap()["method"], "Monitor");
    peer
}

fn level_answer(channel: i64, level: i64) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": "MessageAlert",
        "params": { "id": 994, "data": [0, 1, 0, channel, 18, level] }
    })
    .to_string()
}

/// Behave like a gateway: remember channel levels, echo scene commands,
/// answer level queries. After an "off" scene the stored levels are left
/// untouched, which is what the real hardware reports.
fn serve(mut peer: GatewayPeer, channels: usize) -> JoinHandle<GatewayPeer> {
    tokio::spawn(async move {
        let mut levels = vec![0_i64; channels + 1];
        while let Some(frame) = peer.next_frame().await {
            if frame["method"] != "Transmit" {
                continue;
            }
            let id = frame["params"]["id"].as_i64().unwrap();
            let data: Vec<i64> = serde_json::from_value(frame["params"]["data"].clone()).unwrap();
            match (id, data.as_slice()) {
                (1000, [0, 1, 0, ch, 18]) => {
                    peer.push(level_answer(*ch, levels[*ch as usize]));
                }
                (1000, [0, 1, 0, ch, 1, pct, 0]) => levels[*ch as usize] = *pct,
                (1001, [0, 1, 1, scene, t]) => {
                    peer.push(
                        json!({
                            "method": "MessageAlert",
                            "params": { "id": 1001, "data": [0, 1, 1, scene, t] }
                        })
                        .to_string(),
                    );
                }
                other => panic!("unexpected transmit {other:?}"),
            }
        }
        peer
    })
}

fn transmit_data(frame: &Value) -> Vec<i64> {
    serde_json::from_value(frame["params"]["data"].clone()).unwrap()
}

// ── Commands and queries ────────────────────────────────────────────

#[tokio::test]
async fn set_then_query_reports_level() {
    let h = harness(3);
    let gateway = serve(connect(&h).await, 3);

    h.connection.set_channel_level(2, 50).await.unwrap();
    let levels = h.connection.query_channel_levels().await.unwrap();

    assert_eq!(levels, vec![0, 50, 0]);
    assert_eq!(h.connection.channel_levels(), vec![0, 50, 0]);

    h.connection.disconnect().await.unwrap();
    gateway.await.unwrap();
}

#[tokio::test]
async fn frames_go_out_in_call_order() {
    let h = harness(2);
    let mut peer = connect(&h).await;

    h.connection.set_scene(3, 10).await.unwrap();
    h.connection.set_channel_level(1, 75).await.unwrap();
    h.connection.set_scene(0, 0).await.unwrap();

    let first = peer.next_frame().await.unwrap();
    assert_eq!(first["method"], "Transmit");
    assert_eq!(first["params"]["id"], 1001);
    assert_eq!(transmit_data(&first), vec![0, 1, 1, 3, 10]);

    let second = peer.next_frame().await.unwrap();
    assert_eq!(second["params"]["id"], 1000);
    assert_eq!(transmit_data(&second), vec![0, 1, 0, 1, 1, 75, 0]);

    let third = peer.next_frame().await.unwrap();
    assert_eq!(transmit_data(&third), vec![0, 1, 1, 0, 0]);
}

#[tokio::test]
async fn off_scene_corrects_exactly_one_answer() {
    let h = harness(2);
    let gateway = serve(connect(&h).await, 2);

    h.connection.set_channel_level(1, 65).await.unwrap();
    h.connection.set_channel_level(2, 30).await.unwrap();
    h.connection.set_scene(0, 0).await.unwrap();

    // The gateway still reports the old level for the first answer.
    assert_eq!(h.connection.query_channel_levels().await.unwrap(), vec![0, 30]);
    assert_eq!(h.connection.query_channel_levels().await.unwrap(), vec![65, 30]);

    h.connection.disconnect().await.unwrap();
    gateway.await.unwrap();
}

#[tokio::test]
async fn invalid_level_is_rejected_before_sending() {
    let h = harness(2);
    let _peer = connect(&h).await;

    let err = h.connection.set_channel_level(0, 50).await.unwrap_err();
    assert_eq!(err.code(), -32602);
    let err = h.connection.set_channel_level(1, 101).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidParams { .. }));
}

#[tokio::test]
async fn zero_channels_sends_nothing() {
    let h = harness(0);
    let mut peer = connect(&h).await;

    let err = h.connection.query_channel_levels().await.unwrap_err();
    assert!(matches!(err, CoreError::NoChannelsConfigured));
    assert_eq!(err.code(), -32005);

    h.connection.disconnect().await.unwrap();
    assert!(peer.next_frame().await.is_none());
}

#[tokio::test]
async fn concurrent_query_fails_fast() {
    let h = harness(1);
    let mut peer = connect(&h).await;

    let first = tokio::spawn({
        let connection = Arc::clone(&h.connection);
        async move { connection.query_channel_levels().await }
    });

    // The query frame is only sent once the slot is held.
    let query = peer.next_frame().await.unwrap();
    assert_eq!(transmit_data(&query), vec![0, 1, 0, 1, 18]);

    let err = h.connection.query_channel_levels().await.unwrap_err();
    assert!(matches!(err, CoreError::QueryInFlight));
    assert_eq!(err.code(), -32006);

    assert!(peer.push(level_answer(1, 40)));
    assert_eq!(first.await.unwrap().unwrap(), vec![40]);
}

#[tokio::test]
async fn malformed_frames_are_skipped() {
    let h = harness(1);
    let peer = connect(&h).await;
    assert!(peer.push("{\"method\": \"MessageAlert\", \"params\": 5}"));
    assert!(peer.push("not even json"));
    let gateway = serve(peer, 1);

    h.connection.set_channel_level(1, 20).await.unwrap();
    assert_eq!(h.connection.query_channel_levels().await.unwrap(), vec![20]);
    assert!(h.connection.is_connected().await);

    h.connection.disconnect().await.unwrap();
    gateway.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn silent_gateway_times_out() {
    let h = harness(2);
    let _peer = connect(&h).await;

    let err = h.connection.query_channel_levels().await.unwrap_err();
    assert!(matches!(err, CoreError::QueryTimeout { channel: 1, .. }));
    assert_eq!(err.code(), -32007);

    // The slot is free again.
    let err = h.connection.query_channel_levels().await.unwrap_err();
    assert!(matches!(err, CoreError::QueryTimeout { .. }));
}

// ── Notifications ───────────────────────────────────────────────────

#[tokio::test]
async fn attribute_change_is_forwarded() {
    let mut h = harness(1);
    let peer = connect(&h).await;

    assert!(peer.push(
        json!({ "method": "AttributeChangeAlert", "params": { "attribute": "level" } })
            .to_string()
    ));
    tokio::time::timeout(Duration::from_secs(1), h.notified.recv())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn answers_keep_their_index_between_notifications() {
    let mut h = harness(2);
    let mut peer = connect(&h).await;

    let gateway = tokio::spawn(async move {
        for (channel, level) in [(1, 11), (2, 22)] {
            let query = peer.next_frame().await.unwrap();
            assert_eq!(transmit_data(&query), vec![0, 1, 0, channel, 18]);
            assert!(peer.push(
                json!({ "method": "AttributeChangeAlert", "params": { "attribute": "level" } })
                    .to_string()
            ));
            assert!(peer.push(level_answer(channel, level)));
        }
        peer
    });

    assert_eq!(h.connection.query_channel_levels().await.unwrap(), vec![11, 22]);
    assert_eq!(h.connection.channel_levels(), vec![11, 22]);
    tokio::time::timeout(Duration::from_secs(1), h.notified.recv())
        .await
        .unwrap()
        .unwrap();

    let _peer = gateway.await.unwrap();
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn commands_need_a_connection() {
    let h = harness(1);
    let err = h.connection.set_scene(1, 0).await.unwrap_err();
    assert!(matches!(err, CoreError::NotConnected));
    assert!(!h.connection.is_connected().await);
}

#[tokio::test]
async fn refused_connect_reports_host() {
    let h = harness(1);
    h.connector.refuse_next();

    let err = h.connection.connect().await.unwrap_err();
    assert_eq!(err.code(), -32000);
    assert!(err.to_string().contains("eg2s.test"));
    assert!(!h.connection.is_connected().await);
}

#[tokio::test]
async fn second_disconnect_fails() {
    let h = harness(1);
    let mut peer = connect(&h).await;

    h.connection.disconnect().await.unwrap();
    assert!(peer.next_frame().await.is_none());
    assert!(peer.reader_gone());

    let err = h.connection.disconnect().await.unwrap_err();
    assert_eq!(err.code(), -32003);
}

#[tokio::test]
async fn reconnect_replaces_link_and_listener() {
    let h = harness(1);
    let old = serve(connect(&h).await, 1);

    let (result, mut peer) = tokio::join!(h.connection.reconnect(), h.connector.accept());
    result.unwrap();

    // The old gateway side saw its writer close and its reader go away.
    let old = old.await.unwrap();
    assert!(old.reader_gone());
    assert_eq!(h.connector.connect_count(), 2);

    assert_eq!(peer.next_frame().await.unwrap()["method"], "LogIn");
    assert_eq!(peer.next_frame().await.unwrap()["method"], "Monitor");
    let gateway = serve(peer, 1);

    h.connection.set_channel_level(1, 90).await.unwrap();
    assert_eq!(h.connection.query_channel_levels().await.unwrap(), vec![90]);

    h.connection.disconnect().await.unwrap();
    gateway.await.unwrap();
}

#[tokio::test]
async fn reconnect_aborts_when_disconnect_fails() {
    let h = harness(1);

    let err = h.connection.reconnect().await.unwrap_err();
    assert!(matches!(err, CoreError::Disconnect { .. }));
    assert_eq!(h.connector.connect_count(), 0);
}

#[tokio::test]
async fn read_failure_abandons_query_and_refresh_recovers() {
    let h = harness(1);
    let mut peer = connect(&h).await;

    let query = tokio::spawn({
        let connection = Arc::clone(&h.connection);
        async move { connection.query_channel_levels().await }
    });
    peer.next_frame().await.unwrap();
    assert!(peer.fail_read("connection reset by peer"));

    let err = query.await.unwrap().unwrap_err();
    assert!(matches!(err, CoreError::QueryAbandoned { channel: 1 }));
    assert!(err.needs_reconnect());
    assert!(!h.connection.is_connected().await);

    let err = h.connection.set_scene(1, 0).await.unwrap_err();
    assert!(matches!(err, CoreError::NotConnected));

    let (result, peer) = tokio::join!(h.connection.refresh(), h.connector.accept());
    result.unwrap();
    assert!(h.connection.is_connected().await);
    drop(peer);
}

#[tokio::test(start_paused = true)]
async fn daily_schedule_refreshes_connection() {
    let h = harness(1);
    let _first = connect(&h).await;

    let schedule = DailyReconnect::spawn(Arc::clone(&h.connection), 4);
    let _second = h.connector.accept().await;
    assert!(h.connector.connect_count() >= 2);

    assert!(schedule.shutdown().await);
}
