//! Database row types for all tables. Serialized forms use camelCase field
//! names, matching the JSON the web client consumes.

use rusqlite::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct User {
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub owner: String,
    /// Count of completed tasks; recomputed on every task mutation.
    pub completed: i64,
    pub total: i64,
    pub created_at: String,
}

impl Project {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            owner: row.get(2)?,
            completed: row.get(3)?,
            total: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

/// Column list matching `Project::from_row`.
pub const PROJECT_COLUMNS: &str = "id, name, owner, completed, total, created_at";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    pub text: String,
    pub assigned_to: String,
    pub completed: bool,
    pub created_at: String,
}

impl Task {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            text: row.get(2)?,
            assigned_to: row.get(3)?,
            completed: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

pub const TASK_COLUMNS: &str = "id, project_id, text, assigned_to, completed, created_at";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    /// None for the global room.
    pub project_id: Option<i64>,
    pub user: String,
    pub text: String,
    pub timestamp: String,
}

impl ChatMessage {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            user: row.get(2)?,
            text: row.get(3)?,
            timestamp: row.get(4)?,
        })
    }
}

pub const MESSAGE_COLUMNS: &str = "id, project_id, user, text, timestamp";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: i64,
    pub project_id: i64,
    pub user: String,
    pub action: String,
    pub timestamp: String,
}

impl Activity {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            user: row.get(2)?,
            action: row.get(3)?,
            timestamp: row.get(4)?,
        })
    }
}

pub const ACTIVITY_COLUMNS: &str = "id, project_id, user, action, timestamp";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub id: i64,
    pub project_id: i64,
    pub project_name: String,
    pub from_email: String,
    pub to_email: String,
    pub status: String,
    pub created_at: String,
}

impl Invitation {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            project_name: row.get(2)?,
            from_email: row.get(3)?,
            to_email: row.get(4)?,
            status: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

pub const INVITATION_COLUMNS: &str =
    "id, project_id, project_name, from_email, to_email, status, created_at";
