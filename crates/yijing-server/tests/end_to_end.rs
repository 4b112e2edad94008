// Both transports and the HTTP routes against a server on an ephemeral port.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use yijing_server::config::Config;
use yijing_server::divination::DailyOracle;
use yijing_server::server::{serve, AppState};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const STEP: Duration = Duration::from_secs(5);

fn test_config() -> Config {
    let mut config = Config::default();
    config.connection.hub_tick_ms = 200;
    config.onebot.self_id = 4242;
    // Keep bot heartbeats out of the request/response exchange.
    config.onebot.heartbeat_interval_ms = 60_000;
    config
}

async fn start_server() -> SocketAddr {
    start_server_with(test_config()).await
}

async fn start_server_with(config: Config) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(config, Arc::new(DailyOracle::new("http://localhost:8090")));

    tokio::spawn(async move {
        serve(listener, state).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, path: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{}{}", addr, path)).await.unwrap();
    ws
}

/// Next text frame as JSON, skipping control frames.
async fn next_json(ws: &mut Client) -> Value {
    loop {
        let msg = timeout(STEP, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("transport error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Skip frames until one satisfies `pred`.
async fn next_matching(ws: &mut Client, pred: impl Fn(&Value) -> bool) -> Value {
    loop {
        let value = next_json(ws).await;
        if pred(&value) {
            return value;
        }
    }
}

#[tokio::test]
async fn generic_client_gets_welcome_and_heartbeat() {
    let addr = start_server().await;
    let mut ws = connect(addr, "/ws").await;

    let welcome = next_json(&mut ws).await;
    assert_eq!(welcome["type"], "connect");
    let id = welcome["data"]["id"].as_str().unwrap();
    assert!(id.starts_with("client_"));

    let heartbeat = next_matching(&mut ws, |v| v["type"] == "heartbeat").await;
    assert!(heartbeat["data"]["clients"].as_u64().unwrap() >= 1);
    assert_eq!(heartbeat["data"]["server"], "yijing-api");
}

#[tokio::test]
async fn generic_client_divines_and_echoes_heartbeat() {
    let addr = start_server().await;
    let mut ws = connect(addr, "/ws").await;
    let welcome = next_json(&mut ws).await;
    let id = welcome["data"]["id"].as_str().unwrap().to_string();

    // Garbage is dropped without closing the connection.
    ws.send(Message::Text("{broken".into())).await.unwrap();

    ws.send(Message::Text(json!({"type": "divine", "data": {"type": "today"}}).to_string()))
        .await
        .unwrap();
    let result = next_matching(&mut ws, |v| v["type"] == "divine").await;
    assert!(result["data"]["id"].as_str().unwrap().starts_with("divine_"));
    assert!(result["data"]["imagepath"]
        .as_str()
        .unwrap()
        .starts_with("http://localhost:8090/output/"));

    ws.send(Message::Text(json!({"type": "divine", "data": {"type": "yesterday"}}).to_string()))
        .await
        .unwrap();
    let error = next_matching(&mut ws, |v| v["type"] == "error").await;
    assert!(error["data"]["error"].as_str().unwrap().contains("yesterday"));

    ws.send(Message::Text(json!({"type": "heartbeat"}).to_string()))
        .await
        .unwrap();
    let echo = next_matching(&mut ws, |v| {
        v["type"] == "heartbeat" && v["data"]["client_id"].is_string()
    })
    .await;
    assert_eq!(echo["data"]["client_id"], id.as_str());
}

#[tokio::test]
async fn bot_gets_lifecycle_and_answers_actions() {
    let addr = start_server().await;
    let mut bot = connect(addr, "/onebot/ws").await;

    let lifecycle = next_json(&mut bot).await;
    assert_eq!(lifecycle["post_type"], "meta_event");
    assert_eq!(lifecycle["meta_event_type"], "lifecycle");
    assert_eq!(lifecycle["sub_type"], "connect");
    assert_eq!(lifecycle["self_id"], 4242);

    bot.send(Message::Text(json!({"action": "get_version_info", "echo": 42}).to_string()))
        .await
        .unwrap();
    let resp = next_matching(&mut bot, |v| v.get("retcode").is_some()).await;
    assert_eq!(resp["status"], "success");
    assert_eq!(resp["retcode"], 0);
    assert_eq!(resp["echo"], 42);
    assert_eq!(resp["data"]["onebot_version"], "11");

    bot.send(Message::Text(json!({"action": "delete_msg", "echo": "abc"}).to_string()))
        .await
        .unwrap();
    let resp = next_matching(&mut bot, |v| v.get("retcode").is_some()).await;
    assert_eq!(resp["status"], "failed");
    assert_eq!(resp["retcode"], 1404);
    assert_eq!(resp["echo"], "abc");
}

/// Registration is applied by the hub loop after the upgrade; poll until
/// the route reports `expected` clients.
async fn wait_for_status(http: &reqwest::Client, url: &str, expected: u64) -> Value {
    for _ in 0..100 {
        let status: Value = http.get(url).send().await.unwrap().json().await.unwrap();
        if status["data"]["connected_clients"] == expected {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} never reported {} clients", url, expected);
}

#[tokio::test]
async fn status_routes_count_live_connections() {
    let addr = start_server().await;
    let mut ws = connect(addr, "/ws").await;
    let mut bot = connect(addr, "/onebot/ws").await;
    next_json(&mut ws).await;
    next_json(&mut bot).await;

    let http = reqwest::Client::new();
    let status = wait_for_status(&http, &format!("http://{}/api/ws/status", addr), 1).await;
    assert_eq!(status["code"], 200);
    assert_eq!(status["data"]["websocket_enabled"], true);
    assert!(status["data"]["server_time"].as_i64().unwrap() > 0);

    let status = wait_for_status(&http, &format!("http://{}/api/onebot/status", addr), 1).await;
    assert!(status["data"]["server_time"].is_i64());
    assert_eq!(status["data"]["onebot_version"], "11");
    assert_eq!(status["data"]["implementation"], "yijing-onebot");

    // Closing the socket unregisters it.
    ws.close(None).await.unwrap();
    wait_for_status(&http, &format!("http://{}/api/ws/status", addr), 0).await;
}

#[tokio::test]
async fn http_divine_fans_out_to_both_transports() {
    let addr = start_server().await;
    let mut ws = connect(addr, "/ws").await;
    let mut bot = connect(addr, "/onebot/ws").await;
    next_json(&mut ws).await;
    next_json(&mut bot).await;

    let http = reqwest::Client::new();
    let resp = http
        .post(format!("http://{}/api/divine", addr))
        .json(&json!({"type": "today", "group_id": 9876}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let result_id = body["data"]["id"].as_str().unwrap().to_string();

    let envelope = next_matching(&mut ws, |v| v["type"] == "divine").await;
    assert_eq!(envelope["data"]["id"], result_id.as_str());

    let event = next_matching(&mut bot, |v| v["post_type"] == "message").await;
    assert_eq!(event["message_type"], "group");
    assert_eq!(event["group_id"], 9876);
    assert_eq!(event["message"][0]["type"], "text");

    // The forwarded event went through this bot's own counters.
    bot.send(Message::Text(json!({"action": "get_status", "echo": "s"}).to_string()))
        .await
        .unwrap();
    let status = next_matching(&mut bot, |v| v["echo"] == "s").await;
    assert_eq!(status["data"]["stat"]["message_sent"], 1);
    assert_eq!(status["data"]["stat"]["packet_sent"], 2);
    assert_eq!(status["data"]["stat"]["packet_received"], 1);

    let bad = http
        .post(format!("http://{}/api/divine", addr))
        .header("content-type", "application/json")
        .body("{nope")
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 400);
}

#[tokio::test]
async fn empty_divine_body_is_rejected() {
    let addr = start_server().await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("http://{}/api/divine", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], 400);
    assert_eq!(body["message"], "request body is empty");

    let today = http
        .post(format!("http://{}/api/divine", addr))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(today.status(), 200);
}

fn silent_peer_config() -> Config {
    let mut config = test_config();
    config.connection.read_timeout_ms = 300;
    config.connection.ping_interval_ms = 250;
    config
}

#[tokio::test]
async fn silent_client_is_dropped_after_read_deadline() {
    let addr = start_server_with(silent_peer_config()).await;
    let http = reqwest::Client::new();

    // Never polled, so pings go unanswered.
    let _ws = connect(addr, "/ws").await;
    let url = format!("http://{}/api/ws/status", addr);
    wait_for_status(&http, &url, 1).await;
    wait_for_status(&http, &url, 0).await;
}

#[tokio::test]
async fn silent_bot_is_dropped_after_read_deadline() {
    let addr = start_server_with(silent_peer_config()).await;
    let http = reqwest::Client::new();

    let _bot = connect(addr, "/onebot/ws").await;
    let url = format!("http://{}/api/onebot/status", addr);
    wait_for_status(&http, &url, 1).await;
    wait_for_status(&http, &url, 0).await;
}

#[tokio::test]
async fn bot_heartbeat_arrives_on_the_wire() {
    let mut config = test_config();
    config.onebot.heartbeat_interval_ms = 100;
    let addr = start_server_with(config).await;
    let mut bot = connect(addr, "/onebot/ws").await;

    let heartbeat = next_matching(&mut bot, |v| v["meta_event_type"] == "heartbeat").await;
    assert_eq!(heartbeat["post_type"], "meta_event");
    assert_eq!(heartbeat["self_id"], 4242);
    assert_eq!(heartbeat["interval"], 100);
    assert_eq!(heartbeat["status"]["online"], true);
    assert!(heartbeat["status"]["stat"]["packet_sent"].as_i64().unwrap() >= 1);
}

#[tokio::test]
async fn oversized_frame_closes_the_connection() {
    let addr = start_server().await;
    let http = reqwest::Client::new();
    let url = format!("http://{}/api/ws/status", addr);

    let mut ws = connect(addr, "/ws").await;
    next_json(&mut ws).await;
    wait_for_status(&http, &url, 1).await;

    let huge = "x".repeat(64 * 1024 + 1);
    // The server may reset before the send completes.
    let _ = ws.send(Message::Text(huge)).await;
    wait_for_status(&http, &url, 0).await;
}

#[tokio::test]
async fn rendered_images_are_served_from_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let image: PathBuf = dir.path().join("2024-03-09.png");
    std::fs::write(&image, b"\x89PNG fake").unwrap();

    let mut config = test_config();
    config.server.output_dir = dir.path().to_path_buf();
    let addr = start_server_with(config).await;
    let http = reqwest::Client::new();

    let resp = http
        .get(format!("http://{}/output/2024-03-09.png", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(&resp.bytes().await.unwrap()[..], b"\x89PNG fake");

    let missing = http
        .get(format!("http://{}/output/1999-01-01.png", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}
