//! Per-project activity feed. Entries are append-only; posting one
//! broadcasts `new-activity` to the project room.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::middleware::CurrentUser;
use crate::db::models::{Activity, ACTIVITY_COLUMNS};
use crate::projects::has_access;
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::events::ServerEvent;

#[derive(Debug, Deserialize)]
pub struct PostActivityRequest {
    pub action: String,
}

/// GET /api/projects/{id}/activities
pub async fn list_activities(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<Activity>>, (StatusCode, String)> {
    let db = state.db.clone();
    let email = user.email.clone();

    let activities = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        if !has_access(&conn, project_id, &email)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Check access: {}", e)))?
        {
            return Err((StatusCode::NOT_FOUND, "Project not found".to_string()));
        }

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM activities WHERE project_id = ?1 ORDER BY id DESC",
                ACTIVITY_COLUMNS
            ))
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query activities: {}", e)))?;
        let activities: Vec<Activity> = stmt
            .query_map([project_id], Activity::from_row)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Read activities: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok::<_, (StatusCode, String)>(activities)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(Json(activities))
}

/// POST /api/projects/{id}/activities
pub async fn post_activity(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(project_id): Path<i64>,
    Json(req): Json<PostActivityRequest>,
) -> Result<(StatusCode, Json<Activity>), (StatusCode, String)> {
    let db = state.db.clone();
    let email = user.email.clone();

    let activity = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        if !has_access(&conn, project_id, &email)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Check access: {}", e)))?
        {
            return Err((StatusCode::NOT_FOUND, "Project not found".to_string()));
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO activities (project_id, user, action, timestamp) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![project_id, email, req.action, now],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert activity: {}", e)))?;

        Ok::<_, (StatusCode, String)>(Activity {
            id: conn.last_insert_rowid(),
            project_id,
            user: email,
            action: req.action,
            timestamp: now,
        })
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    broadcast::to_project(
        &state.registry,
        project_id,
        &ServerEvent::NewActivity {
            activity: activity.clone(),
        },
    );

    Ok((StatusCode::CREATED, Json(activity)))
}
