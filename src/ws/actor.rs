//! Actor-per-connection loop for an accepted WebSocket.
//!
//! The socket is split into reader and writer halves. The writer task owns
//! the sink and forwards frames from the connection's mpsc channel, so any
//! part of the system can push to this client by cloning the sender; a slow
//! or stuck peer only ever backs up its own channel.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;
use crate::ws::protocol;

/// Run one connection until transport close, error, or liveness eviction.
///
/// The connection is registered immediately but stays inert (receives no
/// broadcasts) until the client sends its auth frame. Pongs feed the
/// liveness flag; the periodic monitor does the actual eviction. A
/// half-open peer never completes the close handshake, so the reader also
/// waits on the registry's cancel signal — eviction must terminate the
/// transport, not leave the task parked on a dead socket.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let (id, mut cancel) = state.registry.register(tx.clone());
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    loop {
        tokio::select! {
            inbound = ws_receiver.next() => match inbound {
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => {
                        protocol::handle_text_message(&text, id, &state.registry);
                    }
                    Message::Pong(_) => {
                        state.registry.mark_alive(id);
                    }
                    Message::Ping(data) => {
                        let _ = tx.send(Message::Pong(data));
                    }
                    Message::Binary(_) => {
                        tracing::debug!(connection_id = id, "Ignoring binary frame");
                    }
                    Message::Close(frame) => {
                        tracing::debug!(connection_id = id, reason = ?frame, "Client initiated close");
                        break;
                    }
                },
                Some(Err(e)) => {
                    tracing::debug!(connection_id = id, error = %e, "WebSocket receive error");
                    break;
                }
                None => break,
            },
            // Fires on eviction; also fires with Err if the entry is
            // already gone, which means the same thing here.
            _ = cancel.changed() => {
                tracing::debug!(connection_id = id, "Connection evicted, closing transport");
                break;
            }
        }
    }

    writer_handle.abort();
    state.registry.unregister(id);
}

/// Forward frames from the connection's channel to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            break;
        }
    }
}
