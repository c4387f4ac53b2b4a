//! User directory search, used by the invite dialog.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::auth::handlers::UserResponse;
use crate::auth::middleware::CurrentUser;
use crate::state::AppState;

const SEARCH_LIMIT: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// GET /api/users/search?q= — Literal substring match on email, excluding
/// the caller. An empty query returns nothing; `%` and `_` are ordinary
/// characters, not wildcards.
pub async fn search_users(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<UserResponse>>, (StatusCode, String)> {
    let needle = query.q.trim().to_string();
    if needle.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let db = state.db.clone();
    let caller = user.email.clone();

    let users = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT email FROM users
                 WHERE instr(email, ?1) > 0 AND email != ?2
                 ORDER BY email
                 LIMIT ?3",
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query users: {}", e)))?;
        let users: Vec<UserResponse> = stmt
            .query_map(rusqlite::params![needle, caller, SEARCH_LIMIT], |row| {
                Ok(UserResponse { email: row.get(0)? })
            })
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Read users: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok::<_, (StatusCode, String)>(users)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(Json(users))
}
