//! Broadcast router: fans one event out to the connections that should see
//! it. Called by REST handlers after a successful persistence mutation,
//! never before.
//!
//! Delivery is best-effort and fire-and-forget: no receipt confirmation, no
//! queueing for absent users, and a non-writable connection is skipped. A
//! disconnected client permanently misses the push and recovers via its
//! full-state fetch on reconnect.

use axum::extract::ws::Message;

use crate::ws::events::ServerEvent;
use crate::ws::registry::ConnectionRegistry;

/// Deliver to every authenticated connection subscribed to the project.
pub fn to_project(registry: &ConnectionRegistry, project_id: i64, event: &ServerEvent) {
    if let Some(msg) = encode(event) {
        let delivered = registry.send_to_project(project_id, &msg);
        tracing::trace!(project_id, delivered, "Broadcast to project scope");
    }
}

/// Deliver to every connection held by the user, regardless of scope.
/// Used for cross-project notices such as invitations.
pub fn to_user(registry: &ConnectionRegistry, email: &str, event: &ServerEvent) {
    if let Some(msg) = encode(event) {
        let delivered = registry.send_to_user(email, &msg);
        tracing::trace!(email, delivered, "Broadcast to user");
    }
}

/// Deliver to every connection subscribed to the global room.
pub fn to_global(registry: &ConnectionRegistry, event: &ServerEvent) {
    if let Some(msg) = encode(event) {
        let delivered = registry.send_to_global(&msg);
        tracing::trace!(delivered, "Broadcast to global scope");
    }
}

/// Serialize the envelope once per broadcast call.
fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode event envelope");
            None
        }
    }
}
