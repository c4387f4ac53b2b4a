pub mod crud;
pub mod members;

use rusqlite::Connection;

use crate::db::models::{Project, PROJECT_COLUMNS};

/// Load a project by id.
pub(crate) fn load_project(conn: &Connection, id: i64) -> rusqlite::Result<Option<Project>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM projects WHERE id = ?1",
        PROJECT_COLUMNS
    ))?;
    let mut rows = stmt.query_map([id], Project::from_row)?;
    rows.next().transpose()
}

/// Whether a user may see a project: they own it or are a member.
pub(crate) fn has_access(conn: &Connection, project_id: i64, email: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM projects WHERE id = ?1 AND owner = ?2
            UNION
            SELECT 1 FROM project_members WHERE project_id = ?1 AND email = ?2
        )",
        rusqlite::params![project_id, email],
        |row| row.get(0),
    )
}
