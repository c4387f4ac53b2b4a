//! Task CRUD. Every mutation recomputes the parent project's
//! completed/total aggregate and broadcasts the task event together with
//! the updated project, so subscribed dashboards never need a refetch.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rusqlite::Connection;
use serde::Deserialize;

use crate::auth::middleware::CurrentUser;
use crate::db::models::{Project, Task, TASK_COLUMNS};
use crate::projects::{has_access, load_project};
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::events::ServerEvent;

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub text: String,
    #[serde(rename = "assignedTo", default)]
    pub assigned_to: String,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub text: Option<String>,
    #[serde(rename = "assignedTo")]
    pub assigned_to: Option<String>,
    pub completed: Option<bool>,
}

/// Recompute a project's completed/total counts from its tasks and return
/// the fresh row.
fn recompute_progress(conn: &Connection, project_id: i64) -> rusqlite::Result<Project> {
    conn.execute(
        "UPDATE projects SET
             total = (SELECT COUNT(*) FROM tasks WHERE project_id = ?1),
             completed = (SELECT COUNT(*) FROM tasks WHERE project_id = ?1 AND completed = 1)
         WHERE id = ?1",
        [project_id],
    )?;
    load_project(conn, project_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

fn load_task(conn: &Connection, project_id: i64, task_id: i64) -> rusqlite::Result<Option<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM tasks WHERE id = ?1 AND project_id = ?2",
        TASK_COLUMNS
    ))?;
    let mut rows = stmt.query_map([task_id, project_id], Task::from_row)?;
    rows.next().transpose()
}

/// GET /api/projects/{id}/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<Task>>, (StatusCode, String)> {
    let db = state.db.clone();
    let email = user.email.clone();

    let tasks = tokio::task::spawn_blocking(move || {
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
                "SELECT {} FROM tasks WHERE project_id = ?1 ORDER BY id",
                TASK_COLUMNS
            ))
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query tasks: {}", e)))?;
        let tasks: Vec<Task> = stmt
            .query_map([project_id], Task::from_row)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Read tasks: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok::<_, (StatusCode, String)>(tasks)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(Json(tasks))
}

/// POST /api/projects/{id}/tasks — Create; broadcasts `task-created`.
pub async fn create_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(project_id): Path<i64>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let db = state.db.clone();
    let email = user.email.clone();

    let (task, project) = tokio::task::spawn_blocking(move || {
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
            "INSERT INTO tasks (project_id, text, assigned_to, completed, created_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            rusqlite::params![project_id, req.text, req.assigned_to, now],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert task: {}", e)))?;

        let task = Task {
            id: conn.last_insert_rowid(),
            project_id,
            text: req.text,
            assigned_to: req.assigned_to,
            completed: false,
            created_at: now,
        };
        let project = recompute_progress(&conn, project_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Recompute progress: {}", e)))?;

        Ok::<_, (StatusCode, String)>((task, project))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    broadcast::to_project(
        &state.registry,
        project_id,
        &ServerEvent::TaskCreated {
            task: task.clone(),
            project,
        },
    );

    Ok(Json(task))
}

/// PUT /api/projects/{project_id}/tasks/{task_id} — Partial update;
/// broadcasts `task-updated`.
pub async fn update_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((project_id, task_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let db = state.db.clone();
    let email = user.email.clone();

    let (task, project) = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        if !has_access(&conn, project_id, &email)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Check access: {}", e)))?
        {
            return Err((StatusCode::NOT_FOUND, "Project not found".to_string()));
        }

        let mut task = load_task(&conn, project_id, task_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load task: {}", e)))?
            .ok_or((StatusCode::NOT_FOUND, "Task not found".to_string()))?;

        if let Some(text) = req.text {
            task.text = text;
        }
        if let Some(assigned_to) = req.assigned_to {
            task.assigned_to = assigned_to;
        }
        if let Some(completed) = req.completed {
            task.completed = completed;
        }

        conn.execute(
            "UPDATE tasks SET text = ?1, assigned_to = ?2, completed = ?3 WHERE id = ?4",
            rusqlite::params![task.text, task.assigned_to, task.completed, task_id],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update task: {}", e)))?;

        let project = recompute_progress(&conn, project_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Recompute progress: {}", e)))?;

        Ok::<_, (StatusCode, String)>((task, project))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    broadcast::to_project(
        &state.registry,
        project_id,
        &ServerEvent::TaskUpdated {
            task: task.clone(),
            project,
        },
    );

    Ok(Json(task))
}

/// DELETE /api/projects/{project_id}/tasks/{task_id} — Broadcasts
/// `task-deleted` with the surviving project aggregate.
pub async fn delete_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((project_id, task_id)): Path<(i64, i64)>,
) -> Result<StatusCode, (StatusCode, String)> {
    let db = state.db.clone();
    let email = user.email.clone();

    let project = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        if !has_access(&conn, project_id, &email)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Check access: {}", e)))?
        {
            return Err((StatusCode::NOT_FOUND, "Project not found".to_string()));
        }

        let deleted = conn
            .execute(
                "DELETE FROM tasks WHERE id = ?1 AND project_id = ?2",
                rusqlite::params![task_id, project_id],
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete task: {}", e)))?;
        if deleted == 0 {
            return Err((StatusCode::NOT_FOUND, "Task not found".to_string()));
        }

        recompute_progress(&conn, project_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Recompute progress: {}", e)))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    broadcast::to_project(
        &state.registry,
        project_id,
        &ServerEvent::TaskDeleted { task_id, project },
    );

    Ok(StatusCode::NO_CONTENT)
}
