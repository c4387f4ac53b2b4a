//! Opaque session tokens carried in an HttpOnly cookie.
//!
//! A session is a UUIDv4 issued at register/login and stored server-side;
//! the cookie is the only client-held credential.

use axum::http::HeaderMap;
use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

pub const AUTH_COOKIE: &str = "token";

/// One year, matching the cookie Max-Age the original deployment used.
const COOKIE_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 365;

/// Issue a new session for a user, replacing any existing ones.
pub fn create_session(conn: &Connection, email: &str) -> rusqlite::Result<String> {
    let token = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute("DELETE FROM sessions WHERE email = ?1", [email])?;
    conn.execute(
        "INSERT INTO sessions (token, email, created_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![token, email, now],
    )?;
    Ok(token)
}

/// Look up the user a session token belongs to.
pub fn resolve_token(conn: &Connection, token: &str) -> Option<String> {
    conn.query_row(
        "SELECT email FROM sessions WHERE token = ?1",
        [token],
        |row| row.get(0),
    )
    .ok()
}

/// Set-Cookie value for a freshly issued token.
pub fn auth_cookie(token: &str) -> String {
    format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Strict",
        AUTH_COOKIE, token, COOKIE_MAX_AGE_SECS
    )
}

/// Set-Cookie value that expires the auth cookie immediately.
pub fn clear_cookie() -> String {
    format!("{}=; Max-Age=0; Path=/; HttpOnly; SameSite=Strict", AUTH_COOKIE)
}

/// Extract the session token from the Cookie header, if present.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    for value in headers.get_all(axum::http::header::COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        for pair in raw.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            if parts.next() == Some(AUTH_COOKIE) {
                if let Some(token) = parts.next() {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }
    None
}
