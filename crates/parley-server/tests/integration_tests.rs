//! Integration tests for the Parley signaling relay
//!
//! Each test starts the real axum server on an ephemeral port and talks to
//! it over WebSockets.
//!
//! Run with: cargo test -p parley-server --test integration_tests

use futures_util::{SinkExt, StreamExt};
use parley_protocol::{ClientId, IceServer};
use parley_server::ids::IdGenerator;
use parley_server::relay::{Relay, RelayConfig};
use parley_server::sdp::SdpPolicy;
use parley_server::state::Config;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const DEPENDENCY_DESCRIPTOR: &str =
    "https://aomediacodec.github.io/av1-rtp-spec/#dependency-descriptor-rtp-header-extension";

/// Hands out ids in a fixed order so tests can address peers by name
struct ScriptedIds(Mutex<VecDeque<ClientId>>);

impl IdGenerator for ScriptedIds {
    fn next_id(&self) -> ClientId {
        self.0
            .lock()
            .unwrap()
            .pop_front()
            .expect("test ran out of scripted ids")
    }
}

/// Test server wrapper
struct TestServer {
    addr: std::net::SocketAddr,
    relay: Arc<Relay>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(ids: &[&str]) -> anyhow::Result<Self> {
        let relay_config = RelayConfig {
            ice_servers: vec![IceServer::stun("stun:stun.example.org:3478")],
            sdp_policy: SdpPolicy::default(),
            error_replies: false,
        };
        let config = Config {
            bind_address: "127.0.0.1:0".to_string(),
            relay: relay_config.clone(),
        };

        let generator = ScriptedIds(Mutex::new(ids.iter().map(|id| ClientId::new(*id)).collect()));
        let relay = Arc::new(Relay::with_generator(relay_config, generator));
        let router = parley_server::create_app_with_relay(config, relay.clone());

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            relay,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    async fn connect(&self) -> Socket {
        let (ws, _) = connect_async(self.ws_url())
            .await
            .expect("WebSocket connect failed");
        ws
    }

    /// Connect and consume the hello/iceServers greeting
    async fn join(&self) -> (Socket, String) {
        let mut ws = self.connect().await;
        let hello = recv_json(&mut ws).await;
        assert_eq!(hello["type"], "hello");
        let ice = recv_json(&mut ws).await;
        assert_eq!(ice["type"], "iceServers");
        let id = hello["id"].as_str().unwrap().to_string();
        (ws, id)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn send_json(ws: &mut Socket, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send failed");
}

async fn recv_json(ws: &mut Socket) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .expect("WebSocket error");

        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("frame is not JSON");
        }
    }
}

/// True when nothing but pings arrive within a short window
async fn stays_silent(ws: &mut Socket) -> bool {
    loop {
        match timeout(Duration::from_millis(300), ws.next()).await {
            Err(_) => return true,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            Ok(_) => return false,
        }
    }
}

/// True when the server dropped the transport without sending any data
/// or a close frame
async fn dropped_without_close(ws: &mut Socket) -> bool {
    loop {
        match timeout(Duration::from_secs(5), ws.next()).await {
            Err(_) => return false,
            Ok(None) | Ok(Some(Err(_))) => return true,
            Ok(Some(Ok(Message::Close(_) | Message::Text(_) | Message::Binary(_)))) => {
                return false;
            }
            Ok(Some(Ok(_))) => continue,
        }
    }
}

async fn wait_until_removed(relay: &Relay, id: &str) -> bool {
    let id = ClientId::new(id);
    for _ in 0..50 {
        if !relay.registry().contains(&id).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

fn offer_sdp(eol: &str, extra_section: Option<&str>) -> String {
    let denied = format!("a=extmap:12 {DEPENDENCY_DESCRIPTOR}");
    let mut lines = vec![
        "v=0",
        "o=- 5417198370112849237 2 IN IP4 127.0.0.1",
        "s=-",
        "t=0 0",
        "a=group:BUNDLE 0 1",
        "a=msid-semantic: WMS",
        "m=audio 9 UDP/TLS/RTP/SAVPF 111",
        "c=IN IP4 0.0.0.0",
        "a=mid:0",
        "a=extmap:1 urn:ietf:params:rtp-hdrext:ssrc-audio-level",
        "a=sendrecv",
        "a=rtpmap:111 opus/48000/2",
        "m=video 9 UDP/TLS/RTP/SAVPF 96",
        "c=IN IP4 0.0.0.0",
        "a=mid:1",
        "a=extmap:2 http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time",
        denied.as_str(),
        "a=sendrecv",
        "a=rtpmap:96 VP8/90000",
    ];
    if let Some(section) = extra_section {
        lines.extend(section.lines());
    }
    let mut sdp = lines.join(eol);
    sdp.push_str(eol);
    sdp
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_greeting() {
    let server = TestServer::start(&["A1"]).await.unwrap();
    let mut ws = server.connect().await;

    assert_eq!(recv_json(&mut ws).await, json!({"type": "hello", "id": "A1"}));
    assert_eq!(
        recv_json(&mut ws).await,
        json!({"type": "iceServers", "iceServers": [{"urls": "stun:stun.example.org:3478"}]})
    );
}

#[tokio::test]
async fn test_offer_scenario_strips_denied_extension() {
    let server = TestServer::start(&["A1", "B1"]).await.unwrap();
    let (mut a, a_id) = server.join().await;
    let (mut b, b_id) = server.join().await;
    assert_eq!((a_id.as_str(), b_id.as_str()), ("A1", "B1"));

    for eol in ["\r\n", "\n"] {
        let sdp = offer_sdp(eol, None);
        let expected = sdp.replace(&format!("a=extmap:12 {DEPENDENCY_DESCRIPTOR}{eol}"), "");
        assert_ne!(sdp, expected);

        send_json(&mut a, json!({"id": "B1", "type": "offer", "sdp": sdp})).await;

        assert_eq!(
            recv_json(&mut b).await,
            json!({"id": "A1", "type": "offer", "sdp": expected})
        );
    }
}

#[tokio::test]
async fn test_answer_and_candidates_relayed_back() {
    let server = TestServer::start(&["A1", "B1"]).await.unwrap();
    let (mut a, _) = server.join().await;
    let (mut b, _) = server.join().await;

    let answer = json!({"id": "A1", "type": "answer", "sdp": "v=0\r\nanything goes\r\n"});
    send_json(&mut b, answer).await;
    assert_eq!(
        recv_json(&mut a).await,
        json!({"id": "B1", "type": "answer", "sdp": "v=0\r\nanything goes\r\n"})
    );

    let candidate = json!({
        "id": "A1",
        "type": "candidate",
        "candidate": {"candidate": "candidate:0 1 UDP 2122252543 10.1.1.5 50000 typ host", "sdpMid": "0"},
        "extra": [1, 2, 3]
    });
    send_json(&mut b, candidate).await;
    assert_eq!(
        recv_json(&mut a).await,
        json!({
            "id": "B1",
            "type": "candidate",
            "candidate": {"candidate": "candidate:0 1 UDP 2122252543 10.1.1.5 50000 typ host", "sdpMid": "0"},
            "extra": [1, 2, 3]
        })
    );
}

#[tokio::test]
async fn test_application_offer_terminates_sender() {
    let server = TestServer::start(&["A1", "B1"]).await.unwrap();
    let (mut a, _) = server.join().await;
    let (mut b, _) = server.join().await;

    let sdp = offer_sdp(
        "\r\n",
        Some("m=application 9 UDP/DTLS/SCTP webrtc-datachannel\na=mid:2\na=sctp-port:5000"),
    );
    send_json(&mut a, json!({"id": "B1", "type": "offer", "sdp": sdp})).await;

    assert!(
        dropped_without_close(&mut a).await,
        "sender should be dropped without a close frame"
    );
    assert!(stays_silent(&mut b).await, "nothing should be forwarded");
    assert!(wait_until_removed(&server.relay, "A1").await);
    assert!(server.relay.registry().contains(&ClientId::new("B1")).await);
}

#[tokio::test]
async fn test_malformed_offer_terminates_sender() {
    let server = TestServer::start(&["A1", "B1"]).await.unwrap();
    let (mut a, _) = server.join().await;
    let (mut b, _) = server.join().await;

    send_json(&mut a, json!({"id": "B1", "type": "offer", "sdp": "<not an sdp>"})).await;

    assert!(dropped_without_close(&mut a).await);
    assert!(stays_silent(&mut b).await);
}

#[tokio::test]
async fn test_unknown_destination_keeps_sender_open() {
    let server = TestServer::start(&["A1", "B1"]).await.unwrap();
    let (mut a, _) = server.join().await;
    let (mut b, _) = server.join().await;

    send_json(&mut a, json!({"id": "nobody", "type": "answer", "sdp": "v=0"})).await;
    send_json(&mut a, json!({"type": "candidate", "candidate": "no destination"})).await;
    a.send(Message::Text("{ not json".into())).await.unwrap();
    assert!(stays_silent(&mut a).await);

    // Still routable afterwards
    send_json(&mut a, json!({"id": "B1", "type": "bye"})).await;
    assert_eq!(recv_json(&mut b).await, json!({"id": "A1", "type": "bye"}));
}

#[tokio::test]
async fn test_duplicate_id_drops_new_connection() {
    let server = TestServer::start(&["A1", "A1"]).await.unwrap();
    let (mut first, _) = server.join().await;

    let mut second = server.connect().await;
    assert!(dropped_without_close(&mut second).await);

    // The original holder of the id is unaffected
    assert!(server.relay.registry().contains(&ClientId::new("A1")).await);
    send_json(&mut first, json!({"id": "A1", "type": "note"})).await;
    assert_eq!(recv_json(&mut first).await, json!({"id": "A1", "type": "note"}));
}

#[tokio::test]
async fn test_disconnect_removes_registration() {
    let server = TestServer::start(&["A1", "B1"]).await.unwrap();
    let (mut a, _) = server.join().await;
    let (mut b, _) = server.join().await;

    a.close(None).await.unwrap();
    assert!(wait_until_removed(&server.relay, "A1").await);

    // Messages to the departed peer are lost, and B is not told about it
    send_json(&mut b, json!({"id": "A1", "type": "candidate", "candidate": "x"})).await;
    assert!(stays_silent(&mut b).await);
}
