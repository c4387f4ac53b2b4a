//! Integration tests for the reconnecting WebSocket client.

use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

use grouptask_server::client::{ClientConfig, ClientEvent, ConnectionState, LiveClient};
use grouptask_server::ws::Scope;

async fn start_test_server() -> (String, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = grouptask_server::db::init_db(&data_dir).expect("Failed to init DB");
    let state = grouptask_server::state::AppState::new(db);
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

    (format!("http://{}", addr), addr)
}

async fn register_user(base_url: &str, email: &str) -> String {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/auth/create", base_url))
        .json(&json!({ "email": email, "password": "hunter2!" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let cookie = resp
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    cookie
        .split(';')
        .next()
        .unwrap()
        .trim_start_matches("token=")
        .to_string()
}

/// Wait (bounded) until the client reports the wanted state.
async fn wait_for_state(client: &mut LiveClient, wanted: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while client.state() != wanted {
            client.state_changed().await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timed out waiting for {:?}", wanted));
}

#[tokio::test]
async fn test_client_receives_pushed_events() {
    let (base_url, addr) = start_test_server().await;
    let token = register_user(&base_url, "listener@example.com").await;

    let config = ClientConfig::new(
        format!("ws://{}/ws", addr),
        "listener@example.com",
        Scope::Global,
    );
    let mut live = LiveClient::connect(config);
    wait_for_state(&mut live, ConnectionState::Open).await;
    // The Open event precedes any pushes
    match tokio::time::timeout(Duration::from_secs(2), live.next_event())
        .await
        .unwrap()
    {
        Some(ClientEvent::Open) => {}
        other => panic!("Expected Open, got: {:?}", other),
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let http = reqwest::Client::new();
    let resp = http
        .post(format!("{}/api/messages", base_url))
        .header("Cookie", format!("token={}", token))
        .json(&json!({ "text": "ping all" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    match tokio::time::timeout(Duration::from_secs(2), live.next_event())
        .await
        .unwrap()
    {
        Some(ClientEvent::Event { kind, payload }) => {
            assert_eq!(kind, "new-message");
            assert_eq!(payload["message"]["text"], "ping all");
        }
        other => panic!("Expected new-message event, got: {:?}", other),
    }

    live.close();
}

#[tokio::test]
async fn test_unreachable_server_exhausts_retries() {
    // Port 9 (discard) on localhost is assumed closed
    let mut config = ClientConfig::new("ws://127.0.0.1:9/ws", "noone@example.com", Scope::None);
    config.base_delay = Duration::from_millis(10);
    config.max_delay = Duration::from_millis(40);
    config.max_retries = Some(3);

    let mut live = LiveClient::connect(config);

    let mut exhausted = false;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(5), live.next_event()).await
    {
        match event {
            ClientEvent::RetriesExhausted => {
                exhausted = true;
                break;
            }
            ClientEvent::Open => panic!("Must never open against a closed port"),
            _ => {}
        }
    }
    assert!(exhausted, "Expected RetriesExhausted");
    assert_ne!(live.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_socket_dropped_after_handshake_reports_closed() {
    // Accept exactly one WebSocket handshake, then kill the socket before
    // the client gets a word in. Whether the subscription frame send fails
    // or the read loop sees the drop, the attempt must surface as Closed
    // rather than vanish.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);
    });

    let mut config = ClientConfig::new(format!("ws://{}/ws", addr), "gone@example.com", Scope::None);
    config.base_delay = Duration::from_millis(10);
    config.max_delay = Duration::from_millis(40);
    config.max_retries = Some(2);

    let mut live = LiveClient::connect(config);

    let mut saw_closed = false;
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_secs(5), live.next_event()).await
    {
        match event {
            ClientEvent::Closed => saw_closed = true,
            ClientEvent::RetriesExhausted => break,
            _ => {}
        }
    }
    assert!(saw_closed, "A post-handshake drop must emit Closed");
}

#[tokio::test]
async fn test_intentional_close_stops_reconnecting() {
    let (_base_url, addr) = start_test_server().await;

    let config = ClientConfig::new(
        format!("ws://{}/ws", addr),
        "closer@example.com",
        Scope::None,
    );
    let mut live = LiveClient::connect(config);
    wait_for_state(&mut live, ConnectionState::Open).await;

    live.close();
    wait_for_state(&mut live, ConnectionState::Disconnected).await;

    // The loop is gone: the event stream ends without RetriesExhausted
    loop {
        match tokio::time::timeout(Duration::from_secs(2), live.next_event())
            .await
            .expect("Event stream should close after an intentional close")
        {
            None => break,
            Some(ClientEvent::RetriesExhausted) => {
                panic!("Intentional close must not count as exhausted retries")
            }
            Some(_) => continue,
        }
    }
    assert_eq!(live.state(), ConnectionState::Disconnected);
}
