//! Project membership: listing, invitations, removal, and leaving.
//!
//! Inviting creates a pending invitation and pushes `new-invitation` to all
//! of the invited user's connections — whatever scope they are subscribed
//! to, since the invitations UI is not tied to a project room.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::CurrentUser;
use crate::db::models::Invitation;
use crate::projects::{has_access, load_project};
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::events::ServerEvent;

#[derive(Debug, Serialize)]
pub struct MembersResponse {
    pub members: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
}

/// GET /api/projects/{id}/members — Owner first, then members by join date.
pub async fn list_members(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<MembersResponse>, (StatusCode, String)> {
    let db = state.db.clone();
    let email = user.email.clone();

    let members = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        if !has_access(&conn, id, &email)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Check access: {}", e)))?
        {
            return Err((StatusCode::NOT_FOUND, "Project not found".to_string()));
        }

        let project = load_project(&conn, id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load project: {}", e)))?
            .ok_or((StatusCode::NOT_FOUND, "Project not found".to_string()))?;

        let mut stmt = conn
            .prepare("SELECT email FROM project_members WHERE project_id = ?1 ORDER BY joined_at")
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query members: {}", e)))?;
        let mut members = vec![project.owner];
        members.extend(
            stmt.query_map([id], |row| row.get::<_, String>(0))
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Read members: {}", e)))?
                .filter_map(|r| r.ok()),
        );

        Ok::<_, (StatusCode, String)>(members)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(Json(MembersResponse { members }))
}

/// POST /api/projects/{id}/invite — Owner invites a registered user.
pub async fn invite_member(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<InviteRequest>,
) -> Result<(StatusCode, Json<Invitation>), (StatusCode, String)> {
    let db = state.db.clone();
    let from_email = user.email.clone();
    let to_email = req.email.clone();

    let invitation = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let project = load_project(&conn, id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load project: {}", e)))?
            .ok_or((StatusCode::NOT_FOUND, "Project not found".to_string()))?;
        if project.owner != from_email {
            return Err((StatusCode::FORBIDDEN, "Only the owner can invite members".to_string()));
        }
        if to_email == from_email {
            return Err((StatusCode::CONFLICT, "Already a member".to_string()));
        }

        let user_exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                [&to_email],
                |row| row.get(0),
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query user: {}", e)))?;
        if !user_exists {
            return Err((StatusCode::NOT_FOUND, "User not found".to_string()));
        }

        let already_member: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM project_members WHERE project_id = ?1 AND email = ?2)",
                rusqlite::params![id, to_email],
                |row| row.get(0),
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query members: {}", e)))?;
        if already_member {
            return Err((StatusCode::CONFLICT, "Already a member".to_string()));
        }

        let pending: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM invitations
                 WHERE project_id = ?1 AND to_email = ?2 AND status = 'pending')",
                rusqlite::params![id, to_email],
                |row| row.get(0),
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query invitations: {}", e)))?;
        if pending {
            return Err((StatusCode::CONFLICT, "Invitation already pending".to_string()));
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO invitations (project_id, project_name, from_email, to_email, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
            rusqlite::params![id, project.name, from_email, to_email, now],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert invitation: {}", e)))?;

        Ok::<_, (StatusCode, String)>(Invitation {
            id: conn.last_insert_rowid(),
            project_id: id,
            project_name: project.name,
            from_email,
            to_email,
            status: "pending".to_string(),
            created_at: now,
        })
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    broadcast::to_user(
        &state.registry,
        &invitation.to_email,
        &ServerEvent::NewInvitation {
            invitation: invitation.clone(),
        },
    );

    Ok((StatusCode::CREATED, Json(invitation)))
}

/// DELETE /api/projects/{id}/members/{email} — Owner removes a member;
/// broadcasts `member-removed` to the project room.
pub async fn remove_member(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, member_email)): Path<(i64, String)>,
) -> Result<StatusCode, (StatusCode, String)> {
    let db = state.db.clone();
    let caller = user.email.clone();
    let target = member_email.clone();

    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let project = load_project(&conn, id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load project: {}", e)))?
            .ok_or((StatusCode::NOT_FOUND, "Project not found".to_string()))?;
        if project.owner != caller {
            return Err((StatusCode::FORBIDDEN, "Only the owner can remove members".to_string()));
        }
        if project.owner == target {
            return Err((StatusCode::BAD_REQUEST, "Cannot remove the owner".to_string()));
        }

        let removed = conn
            .execute(
                "DELETE FROM project_members WHERE project_id = ?1 AND email = ?2",
                rusqlite::params![id, target],
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Remove member: {}", e)))?;
        if removed == 0 {
            return Err((StatusCode::NOT_FOUND, "Member not found".to_string()));
        }

        Ok::<_, (StatusCode, String)>(())
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    broadcast::to_project(
        &state.registry,
        id,
        &ServerEvent::MemberRemoved {
            project_id: id,
            email: member_email,
        },
    );

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/projects/{id}/leave — A member leaves; broadcasts `member-left`.
pub async fn leave_project(
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
        if project.owner == email {
            return Err((StatusCode::BAD_REQUEST, "The owner cannot leave; delete the project instead".to_string()));
        }

        let removed = conn
            .execute(
                "DELETE FROM project_members WHERE project_id = ?1 AND email = ?2",
                rusqlite::params![id, email],
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Leave project: {}", e)))?;
        if removed == 0 {
            return Err((StatusCode::NOT_FOUND, "Not a member".to_string()));
        }

        Ok::<_, (StatusCode, String)>(())
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    broadcast::to_project(
        &state.registry,
        id,
        &ServerEvent::MemberLeft {
            project_id: id,
            email: user.email,
        },
    );

    Ok(StatusCode::NO_CONTENT)
}
