use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::middleware::CurrentUser;
use crate::db::models::{Project, PROJECT_COLUMNS};
use crate::projects::{has_access, load_project};
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::events::ServerEvent;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: String,
}

/// GET /api/projects — Projects the caller owns or is a member of.
pub async fn list_projects(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<Project>>, (StatusCode, String)> {
    let db = state.db.clone();
    let email = user.email.clone();

    let projects = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM projects
                 WHERE owner = ?1
                    OR id IN (SELECT project_id FROM project_members WHERE email = ?1)
                 ORDER BY id",
                PROJECT_COLUMNS
            ))
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query projects: {}", e)))?;

        let projects: Vec<Project> = stmt
            .query_map([&email], Project::from_row)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Read projects: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok::<_, (StatusCode, String)>(projects)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(Json(projects))
}

/// POST /api/projects — Create a project owned by the caller.
pub async fn create_project(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateProjectRequest>,
) -> Result<Json<Project>, (StatusCode, String)> {
    let db = state.db.clone();
    let owner = user.email.clone();

    let project = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO projects (name, owner, completed, total, created_at)
             VALUES (?1, ?2, 0, 0, ?3)",
            rusqlite::params![req.name, owner, now],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert project: {}", e)))?;

        Ok::<_, (StatusCode, String)>(Project {
            id: conn.last_insert_rowid(),
            name: req.name,
            owner,
            completed: 0,
            total: 0,
            created_at: now,
        })
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(Json(project))
}

/// GET /api/projects/{id} — 404 unless the caller is owner or member.
pub async fn get_project(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Project>, (StatusCode, String)> {
    let db = state.db.clone();
    let email = user.email.clone();

    let project = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        if !has_access(&conn, id, &email)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Check access: {}", e)))?
        {
            return Err((StatusCode::NOT_FOUND, "Project not found".to_string()));
        }
        load_project(&conn, id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load project: {}", e)))?
            .ok_or((StatusCode::NOT_FOUND, "Project not found".to_string()))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(Json(project))
}

/// PUT /api/projects/{id} — Rename; broadcasts `project-updated` to the
/// project's subscribers.
pub async fn update_project(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, (StatusCode, String)> {
    let db = state.db.clone();
    let email = user.email.clone();

    let project = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        if !has_access(&conn, id, &email)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Check access: {}", e)))?
        {
            return Err((StatusCode::NOT_FOUND, "Project not found".to_string()));
        }

        conn.execute(
            "UPDATE projects SET name = ?1 WHERE id = ?2",
            rusqlite::params![req.name, id],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update project: {}", e)))?;

        load_project(&conn, id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load project: {}", e)))?
            .ok_or((StatusCode::NOT_FOUND, "Project not found".to_string()))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    broadcast::to_project(
        &state.registry,
        id,
        &ServerEvent::ProjectUpdated {
            project: project.clone(),
        },
    );

    Ok(Json(project))
}

/// DELETE /api/projects/{id} — Owner only; cascades to tasks, messages,
/// activities, members, and invitations, then broadcasts `project-deleted`.
pub async fn delete_project(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    let db = state.db.clone();
    let email = user.email.clone();

    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let project = load_project(&conn, id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load project: {}", e)))?
            .ok_or((StatusCode::NOT_FOUND, "Project not found".to_string()))?;
        if project.owner != email {
            return Err((StatusCode::FORBIDDEN, "Only the owner can delete a project".to_string()));
        }

        // Child rows go with it via ON DELETE CASCADE.
        conn.execute("DELETE FROM projects WHERE id = ?1", [id])
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete project: {}", e)))?;

        Ok::<_, (StatusCode, String)>(())
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    broadcast::to_project(
        &state.registry,
        id,
        &ServerEvent::ProjectDeleted { project_id: id },
    );

    Ok(StatusCode::NO_CONTENT)
}
