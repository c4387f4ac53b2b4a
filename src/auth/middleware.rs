use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::auth::session;
use crate::state::AppState;

/// Identity resolved from the session cookie, attached to request
/// extensions by `require_auth` and read back by the extractor.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub email: String,
}

/// Middleware guarding authenticated routes: resolves the `token` cookie to
/// a user and rejects with 401 otherwise.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token =
        session::token_from_headers(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    let db = state.db.clone();
    let email = tokio::task::spawn_blocking(move || {
        let conn = db.lock().ok()?;
        session::resolve_token(&conn, &token)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    .ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(CurrentUser { email });
    Ok(next.run(req).await)
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
