//! Chat messages: per-project rooms plus a cross-project global room.
//! Posting persists the message, then broadcasts `new-message` to the
//! matching scope.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::middleware::CurrentUser;
use crate::db::models::{ChatMessage, MESSAGE_COLUMNS};
use crate::projects::has_access;
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::events::ServerEvent;

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub text: String,
}

/// GET /api/projects/{id}/messages
pub async fn list_project_messages(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<ChatMessage>>, (StatusCode, String)> {
    list_messages(state, user, Some(project_id)).await
}

/// GET /api/messages — The global room.
pub async fn list_global_messages(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<ChatMessage>>, (StatusCode, String)> {
    list_messages(state, user, None).await
}

async fn list_messages(
    state: AppState,
    user: CurrentUser,
    project_id: Option<i64>,
) -> Result<Json<Vec<ChatMessage>>, (StatusCode, String)> {
    let db = state.db.clone();
    let email = user.email.clone();

    let messages = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        if let Some(id) = project_id {
            if !has_access(&conn, id, &email)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Check access: {}", e)))?
            {
                return Err((StatusCode::NOT_FOUND, "Project not found".to_string()));
            }
        }

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM messages
                 WHERE project_id IS ?1
                 ORDER BY id",
                MESSAGE_COLUMNS
            ))
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query messages: {}", e)))?;
        let messages: Vec<ChatMessage> = stmt
            .query_map([project_id], ChatMessage::from_row)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Read messages: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok::<_, (StatusCode, String)>(messages)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(Json(messages))
}

/// POST /api/projects/{id}/messages — Broadcasts to the project room.
pub async fn post_project_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(project_id): Path<i64>,
    Json(req): Json<PostMessageRequest>,
) -> Result<Json<ChatMessage>, (StatusCode, String)> {
    let message = persist_message(&state, &user, Some(project_id), req.text).await?;

    broadcast::to_project(
        &state.registry,
        project_id,
        &ServerEvent::NewMessage {
            message: message.clone(),
        },
    );

    Ok(Json(message))
}

/// POST /api/messages — Broadcasts to the global room.
pub async fn post_global_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<PostMessageRequest>,
) -> Result<Json<ChatMessage>, (StatusCode, String)> {
    let message = persist_message(&state, &user, None, req.text).await?;

    broadcast::to_global(
        &state.registry,
        &ServerEvent::NewMessage {
            message: message.clone(),
        },
    );

    Ok(Json(message))
}

async fn persist_message(
    state: &AppState,
    user: &CurrentUser,
    project_id: Option<i64>,
    text: String,
) -> Result<ChatMessage, (StatusCode, String)> {
    let db = state.db.clone();
    let email = user.email.clone();

    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        if let Some(id) = project_id {
            if !has_access(&conn, id, &email)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Check access: {}", e)))?
            {
                return Err((StatusCode::NOT_FOUND, "Project not found".to_string()));
            }
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO messages (project_id, user, text, timestamp) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![project_id, email, text, now],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert message: {}", e)))?;

        Ok::<_, (StatusCode, String)>(ChatMessage {
            id: conn.last_insert_rowid(),
            project_id,
            user: email,
            text,
            timestamp: now,
        })
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))?
}
