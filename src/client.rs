//! WebSocket client with automatic reconnection.
//!
//! Wraps a tokio-tungstenite connection in a supervision loop: on open it
//! sends the subscription frame, forwards server events to the caller, and
//! on any drop retries with exponential backoff (1s doubling to a 10s cap),
//! resetting the delay after each successful connect. Intentional shutdown
//! closes cleanly and does not reschedule.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::ws::Scope;

const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// ws:// URL of the server's /ws endpoint.
    pub url: String,
    pub user_email: String,
    /// Room to subscribe to once the socket opens.
    pub scope: Scope,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Give up after this many consecutive failed attempts. `None` retries
    /// forever.
    pub max_retries: Option<u32>,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, user_email: impl Into<String>, scope: Scope) -> Self {
        Self {
            url: url.into(),
            user_email: user_email.into(),
            scope,
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
            max_retries: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
}

#[derive(Debug)]
pub enum ClientEvent {
    /// Socket opened and the subscription frame was sent.
    Open,
    /// Socket dropped; a reconnect is scheduled unless shutting down.
    Closed,
    /// `max_retries` consecutive attempts failed; the loop has stopped.
    RetriesExhausted,
    /// A server push, split into its `type` tag and remaining payload.
    Event {
        kind: String,
        payload: serde_json::Value,
    },
}

/// Exponential backoff: base, doubling per failure, capped.
pub(crate) struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self
            .base
            .saturating_mul(1u32 << self.attempt.min(16))
            .min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    fn attempts(&self) -> u32 {
        self.attempt
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Handle to a running client loop.
pub struct LiveClient {
    state: watch::Receiver<ConnectionState>,
    shutdown: watch::Sender<bool>,
    events: mpsc::Receiver<ClientEvent>,
}

impl LiveClient {
    /// Spawn the connection loop. The loop runs until [`close`](Self::close)
    /// is called or retries are exhausted.
    pub fn connect(config: ClientConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::channel(256);

        tokio::spawn(run_loop(config, state_tx, shutdown_rx, event_tx));

        Self {
            state: state_rx,
            shutdown: shutdown_tx,
            events: event_rx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the connection state changes, returning the new state.
    pub async fn state_changed(&mut self) -> ConnectionState {
        let _ = self.state.changed().await;
        *self.state.borrow()
    }

    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Close the connection and stop reconnecting.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}

fn subscription_frame(config: &ClientConfig) -> Message {
    let project_id = match config.scope {
        Scope::None => serde_json::Value::Null,
        Scope::Global => json!("global"),
        Scope::Project(id) => json!(id),
    };
    Message::text(
        json!({
            "type": "auth",
            "projectId": project_id,
            "userEmail": config.user_email,
        })
        .to_string(),
    )
}

async fn run_loop(
    config: ClientConfig,
    state: watch::Sender<ConnectionState>,
    mut shutdown: watch::Receiver<bool>,
    events: mpsc::Sender<ClientEvent>,
) {
    let mut backoff = Backoff::new(config.base_delay, config.max_delay);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let _ = state.send(ConnectionState::Connecting);
        match connect_async(&config.url).await {
            Ok((mut socket, _)) => {
                if socket.send(subscription_frame(&config)).await.is_err() {
                    // The socket died between handshake and first frame;
                    // report the attempt like any other drop.
                    let _ = state.send(ConnectionState::Disconnected);
                    let _ = events.send(ClientEvent::Closed).await;
                } else {
                    backoff.reset();
                    let _ = state.send(ConnectionState::Open);
                    let _ = events.send(ClientEvent::Open).await;
                    tracing::debug!(url = %config.url, "connected");

                    let clean = read_until_closed(&mut socket, &mut shutdown, &events).await;
                    let _ = state.send(ConnectionState::Disconnected);
                    if clean {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                    let _ = events.send(ClientEvent::Closed).await;
                }
            }
            Err(e) => {
                let _ = state.send(ConnectionState::Disconnected);
                tracing::debug!(url = %config.url, error = %e, "connect failed");
            }
        }

        if let Some(max) = config.max_retries {
            if backoff.attempts() >= max {
                let _ = events.send(ClientEvent::RetriesExhausted).await;
                break;
            }
        }

        let delay = backoff.next_delay();
        tracing::debug!(?delay, "reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    let _ = state.send(ConnectionState::Disconnected);
}

/// Pump the socket until it drops or shutdown is requested. Returns true
/// for an intentional (shutdown) close.
async fn read_until_closed<S>(
    socket: &mut tokio_tungstenite::WebSocketStream<S>,
    shutdown: &mut watch::Receiver<bool>,
    events: &mpsc::Sender<ClientEvent>,
) -> bool
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            msg = socket.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = parse_event(&text) {
                            let _ = events.send(event).await;
                        }
                    }
                    // tungstenite answers pings automatically
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return false,
                    Some(Ok(_)) => {}
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}

fn parse_event(text: &str) -> Option<ClientEvent> {
    let mut value: serde_json::Value = serde_json::from_str(text).ok()?;
    let kind = value.get("type")?.as_str()?.to_string();
    if let Some(obj) = value.as_object_mut() {
        obj.remove("type");
    }
    Some(ClientEvent::Event {
        kind,
        payload: value,
    })
}
