//! Invitation inbox: list pending invitations for the caller and resolve
//! them. Accepting adds the caller as a member and broadcasts
//! `member-joined` to the project room.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Serialize;

use crate::auth::middleware::CurrentUser;
use crate::db::models::{Invitation, Project, INVITATION_COLUMNS};
use crate::projects::load_project;
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::events::ServerEvent;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptResponse {
    pub project: Project,
}

/// GET /api/invitations — Pending invitations addressed to the caller.
pub async fn list_invitations(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<Invitation>>, (StatusCode, String)> {
    let db = state.db.clone();
    let email = user.email.clone();

    let invitations = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM invitations
                 WHERE to_email = ?1 AND status = 'pending'
                 ORDER BY id DESC",
                INVITATION_COLUMNS
            ))
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query invitations: {}", e)))?;
        let invitations: Vec<Invitation> = stmt
            .query_map([&email], Invitation::from_row)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Read invitations: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok::<_, (StatusCode, String)>(invitations)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(Json(invitations))
}

fn load_pending(
    conn: &rusqlite::Connection,
    invitation_id: i64,
    email: &str,
) -> Result<Invitation, (StatusCode, String)> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM invitations WHERE id = ?1 AND to_email = ?2 AND status = 'pending'",
            INVITATION_COLUMNS
        ))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query invitation: {}", e)))?;
    let mut rows = stmt
        .query_map(rusqlite::params![invitation_id, email], Invitation::from_row)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Read invitation: {}", e)))?;
    rows.next()
        .transpose()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Read invitation: {}", e)))?
        .ok_or((StatusCode::NOT_FOUND, "Invitation not found".to_string()))
}

/// POST /api/invitations/{id}/accept — Join the project and return it.
pub async fn accept_invitation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(invitation_id): Path<i64>,
) -> Result<Json<AcceptResponse>, (StatusCode, String)> {
    let db = state.db.clone();
    let email = user.email.clone();

    let (project, joined) = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let invitation = load_pending(&conn, invitation_id, &email)?;

        // The project may have been deleted while the invitation sat in the
        // inbox; resolve the invitation either way.
        let project = load_project(&conn, invitation.project_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load project: {}", e)))?;

        let joined = if let Some(ref p) = project {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT OR IGNORE INTO project_members (project_id, email, joined_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![p.id, email, now],
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Add member: {}", e)))?
                > 0
        } else {
            false
        };

        conn.execute(
            "UPDATE invitations SET status = 'accepted' WHERE id = ?1",
            [invitation_id],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update invitation: {}", e)))?;

        let project =
            project.ok_or((StatusCode::NOT_FOUND, "Project no longer exists".to_string()))?;
        Ok::<_, (StatusCode, String)>((project, joined))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    if joined {
        broadcast::to_project(
            &state.registry,
            project.id,
            &ServerEvent::MemberJoined {
                project_id: project.id,
                email: user.email,
            },
        );
    }

    Ok(Json(AcceptResponse { project }))
}

/// POST /api/invitations/{id}/decline
pub async fn decline_invitation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(invitation_id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    let db = state.db.clone();
    let email = user.email.clone();

    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        load_pending(&conn, invitation_id, &email)?;

        conn.execute(
            "UPDATE invitations SET status = 'declined' WHERE id = ?1",
            [invitation_id],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update invitation: {}", e)))?;

        Ok::<_, (StatusCode, String)>(())
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(StatusCode::NO_CONTENT)
}
