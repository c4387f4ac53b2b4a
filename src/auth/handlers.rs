use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::CurrentUser;
use crate::auth::session;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub email: String,
}

/// POST /api/auth/create — Register a new user and start a session.
/// 409 if the email is already taken.
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let db = state.db.clone();
    let email = req.email.clone();

    let password_hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Hash password: {}", e)))?;

    let token = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                [&email],
                |row| row.get(0),
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query user: {}", e)))?;
        if exists {
            return Err((StatusCode::CONFLICT, "Existing user".to_string()));
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO users (email, password_hash, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![email, password_hash, now],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert user: {}", e)))?;

        session::create_session(&conn, &email)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Create session: {}", e)))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    tracing::info!(email = %req.email, "User registered");
    Ok((
        [(SET_COOKIE, session::auth_cookie(&token))],
        Json(UserResponse { email: req.email }),
    ))
}

/// POST /api/auth/login — Verify credentials, rotate the session token.
/// 401 on unknown user or bad password, with no distinction between the two.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let db = state.db.clone();
    let email = req.email.clone();
    let password = req.password.clone();

    let token = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let hash: String = conn
            .query_row(
                "SELECT password_hash FROM users WHERE email = ?1",
                [&email],
                |row| row.get(0),
            )
            .map_err(|_| (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()))?;

        // bcrypt verify is constant-time; errors count as a mismatch.
        if !bcrypt::verify(&password, &hash).unwrap_or(false) {
            return Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()));
        }

        session::create_session(&conn, &email)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Create session: {}", e)))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    tracing::info!(email = %req.email, "User logged in");
    Ok((
        [(SET_COOKIE, session::auth_cookie(&token))],
        Json(UserResponse { email: req.email }),
    ))
}

/// DELETE /api/auth/logout — Drop the session (if any) and clear the cookie.
/// Always succeeds: a stale or absent token still gets the cookie cleared.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Some(token) = session::token_from_headers(&headers) {
        let db = state.db.clone();
        tokio::task::spawn_blocking(move || {
            if let Ok(conn) = db.lock() {
                let _ = conn.execute("DELETE FROM sessions WHERE token = ?1", [&token]);
            }
        })
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))?;
    }

    Ok((
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, session::clear_cookie())],
    ))
}

/// GET /api/auth/user — Current identity; the auth middleware already
/// rejected unauthenticated callers.
pub async fn current_user(user: CurrentUser) -> Json<UserResponse> {
    Json(UserResponse { email: user.email })
}
