//! Inbound client message handling.
//!
//! The only defined client→server message is the auth frame sent right after
//! the transport opens:
//!
//! ```json
//! { "type": "auth", "projectId": 42 | null | "global", "userEmail": "a@x.com" }
//! ```
//!
//! Anything else — unknown types, malformed JSON — is logged and discarded;
//! the connection stays open.

use serde::Deserialize;

use crate::ws::registry::{ConnectionId, ConnectionRegistry, Scope};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Auth(AuthMessage),
}

#[derive(Debug, Deserialize)]
pub struct AuthMessage {
    /// Numeric project id, the string "global", or null/absent for no room.
    #[serde(rename = "projectId", default)]
    pub project_id: Option<ProjectRef>,
    #[serde(rename = "userEmail")]
    pub user_email: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ProjectRef {
    Id(i64),
    Named(String),
}

impl AuthMessage {
    pub fn scope(&self) -> Scope {
        match &self.project_id {
            None => Scope::None,
            Some(ProjectRef::Id(id)) => Scope::Project(*id),
            Some(ProjectRef::Named(name)) if name == "global" => Scope::Global,
            Some(ProjectRef::Named(_)) => Scope::None,
        }
    }
}

/// Handle one inbound text frame from a connection.
pub fn handle_text_message(text: &str, id: ConnectionId, registry: &ConnectionRegistry) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Auth(auth)) => {
            registry.authenticate(id, &auth.user_email, auth.scope());
        }
        Err(e) => {
            tracing::debug!(connection_id = id, error = %e, "Ignoring unrecognized frame");
        }
    }
}
