//! Integration tests for WebSocket subscription, scope-based fan-out, and
//! liveness probes.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

type WsRead = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;
type WsWrite = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Helper: start the server on a random port with a fast liveness interval
/// and return (base_url, addr).
async fn start_test_server() -> (String, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = grouptask_server::db::init_db(&data_dir).expect("Failed to init DB");
    let state = grouptask_server::state::AppState::new(db);

    tokio::spawn(grouptask_server::ws::liveness::run(
        state.registry.clone(),
        Duration::from_millis(300),
    ));

    let app = grouptask_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    let base_url = format!("http://{}", addr);
    (base_url, addr)
}

/// Register a user and return the session token from the Set-Cookie header.
async fn register_user(base_url: &str, email: &str) -> String {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/auth/create", base_url))
        .json(&json!({ "email": email, "password": "hunter2!" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200, "Registration failed for {}", email);

    let cookie = resp
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .expect("Expected Set-Cookie")
        .to_str()
        .unwrap();
    // "token=<uuid>; Max-Age=..." — take the value of the first pair
    cookie
        .split(';')
        .next()
        .unwrap()
        .trim_start_matches("token=")
        .to_string()
}

/// Create a project and return its id.
async fn create_project(base_url: &str, token: &str, name: &str) -> i64 {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/projects", base_url))
        .header("Cookie", format!("token={}", token))
        .json(&json!({ "name": name }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    body["id"].as_i64().unwrap()
}

/// Open a WebSocket and send the subscription frame.
/// `project_id` follows the wire format: a number, "global", or null.
async fn connect_ws(addr: SocketAddr, project_id: serde_json::Value, email: &str) -> (WsWrite, WsRead) {
    let ws_url = format!("ws://{}/ws", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to connect to WebSocket");
    let (mut write, read) = ws_stream.split();

    write
        .send(Message::text(
            json!({ "type": "auth", "projectId": project_id, "userEmail": email }).to_string(),
        ))
        .await
        .expect("Failed to send auth frame");

    (write, read)
}

/// Wait for the next text event, skipping ping/pong frames. None on timeout.
async fn next_event(read: &mut WsRead, timeout: Duration) -> Option<serde_json::Value> {
    loop {
        match tokio::time::timeout(timeout, read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return Some(serde_json::from_str(&text).expect("Event should be JSON"));
            }
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            _ => return None,
        }
    }
}

#[tokio::test]
async fn test_project_scope_fanout_is_exact() {
    let (base_url, addr) = start_test_server().await;
    let token = register_user(&base_url, "owner@example.com").await;
    let project_a = create_project(&base_url, &token, "Alpha").await;
    let project_b = create_project(&base_url, &token, "Beta").await;

    let (_wa, mut read_a) = connect_ws(addr, json!(project_a), "owner@example.com").await;
    let (_wb, mut read_b) = connect_ws(addr, json!(project_b), "owner@example.com").await;
    // Small pause so both auth frames are processed before the broadcast
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/projects/{}/messages", base_url, project_a))
        .header("Cookie", format!("token={}", token))
        .json(&json!({ "text": "hello alpha" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let event = next_event(&mut read_a, Duration::from_secs(2))
        .await
        .expect("Project A subscriber should receive the event");
    assert_eq!(event["type"], "new-message");
    assert_eq!(event["message"]["text"], "hello alpha");
    assert_eq!(event["message"]["projectId"], project_a);

    assert!(
        next_event(&mut read_b, Duration::from_millis(300)).await.is_none(),
        "Project B subscriber must not receive project A events"
    );
}

#[tokio::test]
async fn test_global_scope_fanout() {
    let (base_url, addr) = start_test_server().await;
    let token = register_user(&base_url, "globaluser@example.com").await;
    let project = create_project(&base_url, &token, "Side project").await;

    let (_w1, mut global_1) = connect_ws(addr, json!("global"), "globaluser@example.com").await;
    let (_w2, mut global_2) = connect_ws(addr, json!("global"), "globaluser@example.com").await;
    let (_w3, mut project_read) = connect_ws(addr, json!(project), "globaluser@example.com").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/messages", base_url))
        .header("Cookie", format!("token={}", token))
        .json(&json!({ "text": "hello world" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    for read in [&mut global_1, &mut global_2] {
        let event = next_event(read, Duration::from_secs(2))
            .await
            .expect("Global subscriber should receive the event");
        assert_eq!(event["type"], "new-message");
        assert!(event["message"]["projectId"].is_null());
    }

    assert!(
        next_event(&mut project_read, Duration::from_millis(300)).await.is_none(),
        "Project subscriber must not receive global chat"
    );
}

#[tokio::test]
async fn test_unauthenticated_connection_receives_nothing() {
    let (base_url, addr) = start_test_server().await;
    let token = register_user(&base_url, "quiet@example.com").await;

    // Upgrade but never send the subscription frame
    let ws_url = format!("ws://{}/ws", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    let (_write, mut read) = ws_stream.split();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/messages", base_url))
        .header("Cookie", format!("token={}", token))
        .json(&json!({ "text": "anyone there?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    assert!(
        next_event(&mut read, Duration::from_millis(300)).await.is_none(),
        "A connection that never subscribed must receive nothing"
    );
}

#[tokio::test]
async fn test_resubscribe_switches_scope() {
    let (base_url, addr) = start_test_server().await;
    let token = register_user(&base_url, "mover@example.com").await;
    let project = create_project(&base_url, &token, "Moving target").await;

    let (mut write, mut read) = connect_ws(addr, json!(project), "mover@example.com").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Switch to the global room on the same socket
    write
        .send(Message::text(
            json!({ "type": "auth", "projectId": "global", "userEmail": "mover@example.com" })
                .to_string(),
        ))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/projects/{}/messages", base_url, project))
        .header("Cookie", format!("token={}", token))
        .json(&json!({ "text": "old room" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(
        next_event(&mut read, Duration::from_millis(300)).await.is_none(),
        "After rescoping, project events must not arrive"
    );

    let resp = client
        .post(format!("{}/api/messages", base_url))
        .header("Cookie", format!("token={}", token))
        .json(&json!({ "text": "new room" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let event = next_event(&mut read, Duration::from_secs(2))
        .await
        .expect("Rescoped connection should receive global events");
    assert_eq!(event["type"], "new-message");
    assert_eq!(event["message"]["text"], "new room");
}

#[tokio::test]
async fn test_invitation_reaches_user_in_every_scope() {
    let (base_url, addr) = start_test_server().await;
    let owner_token = register_user(&base_url, "inviter@example.com").await;
    let _invitee_token = register_user(&base_url, "invitee@example.com").await;
    let project = create_project(&base_url, &owner_token, "Shared").await;

    // The invitee is connected twice, in different rooms; the invitation is
    // addressed to the identity, so both sockets must get it.
    let (_w1, mut global_read) = connect_ws(addr, json!("global"), "invitee@example.com").await;
    let (_w2, mut null_read) = connect_ws(addr, json!(null), "invitee@example.com").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/projects/{}/invite", base_url, project))
        .header("Cookie", format!("token={}", owner_token))
        .json(&json!({ "email": "invitee@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    for read in [&mut global_read, &mut null_read] {
        let event = next_event(read, Duration::from_secs(2))
            .await
            .expect("Invitee connection should receive the invitation");
        assert_eq!(event["type"], "new-invitation");
        assert_eq!(event["invitation"]["toEmail"], "invitee@example.com");
        assert_eq!(event["invitation"]["projectName"], "Shared");
    }
}

#[tokio::test]
async fn test_task_events_carry_project_aggregate() {
    let (base_url, addr) = start_test_server().await;
    let token = register_user(&base_url, "tasker@example.com").await;
    let project = create_project(&base_url, &token, "Tracked").await;

    let (_w, mut read) = connect_ws(addr, json!(project), "tasker@example.com").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/projects/{}/tasks", base_url, project))
        .header("Cookie", format!("token={}", token))
        .json(&json!({ "text": "write tests" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let task: serde_json::Value = resp.json().await.unwrap();

    let event = next_event(&mut read, Duration::from_secs(2))
        .await
        .expect("Expected task-created");
    assert_eq!(event["type"], "task-created");
    assert_eq!(event["project"]["total"], 1);
    assert_eq!(event["project"]["completed"], 0);

    let resp = client
        .put(format!(
            "{}/api/projects/{}/tasks/{}",
            base_url,
            project,
            task["id"].as_i64().unwrap()
        ))
        .header("Cookie", format!("token={}", token))
        .json(&json!({ "completed": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let event = next_event(&mut read, Duration::from_secs(2))
        .await
        .expect("Expected task-updated");
    assert_eq!(event["type"], "task-updated");
    assert_eq!(event["task"]["completed"], true);
    assert_eq!(event["project"]["completed"], 1);
}

#[tokio::test]
async fn test_connection_closed_before_subscribe_does_not_break_broadcast() {
    let (base_url, addr) = start_test_server().await;
    let token = register_user(&base_url, "survivor@example.com").await;

    // A socket that upgrades and drops immediately
    {
        let ws_url = format!("ws://{}/ws", addr);
        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
        let (mut write, _read) = ws_stream.split();
        write.send(Message::Close(None)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (_w, mut read) = connect_ws(addr, json!("global"), "survivor@example.com").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/messages", base_url))
        .header("Cookie", format!("token={}", token))
        .json(&json!({ "text": "still here" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let event = next_event(&mut read, Duration::from_secs(2))
        .await
        .expect("Surviving subscriber should still receive events");
    assert_eq!(event["message"]["text"], "still here");
}

#[tokio::test]
async fn test_liveness_probe_pings_arrive() {
    let (_base_url, addr) = start_test_server().await;

    let ws_url = format!("ws://{}/ws", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    let (_write, mut read) = ws_stream.split();

    // Liveness interval is 300ms in the test server; a ping must show up
    // well within a second.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .expect("Expected a ping before the deadline");
        match tokio::time::timeout(remaining, read.next()).await {
            Ok(Some(Ok(Message::Ping(_)))) => break,
            Ok(Some(Ok(_))) => continue,
            other => panic!("Expected ping, got: {:?}", other),
        }
    }
}
