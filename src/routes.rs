use axum::{middleware, Router};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::activity;
use crate::auth::handlers as auth_handlers;
use crate::auth::middleware::require_auth;
use crate::chat;
use crate::invitations;
use crate::projects::{crud as project_crud, members as project_members};
use crate::state::AppState;
use crate::tasks;
use crate::users;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting: 5 requests per minute per IP on credential endpoints
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(12) // 1 token every 12 seconds = 5 per minute
            .burst_size(5)
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Spawn background task to clean up rate limiter state
    let limiter_for_cleanup = governor_limiter.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            limiter_for_cleanup.retain_recent();
        }
    });

    // Credential routes with rate limiting
    let auth_routes = Router::new()
        .route(
            "/api/auth/create",
            axum::routing::post(auth_handlers::create),
        )
        .route("/api/auth/login", axum::routing::post(auth_handlers::login))
        .route(
            "/api/auth/logout",
            axum::routing::delete(auth_handlers::logout),
        )
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Everything below requires a valid session cookie.
    let api_routes = Router::new()
        .route(
            "/api/auth/user",
            axum::routing::get(auth_handlers::current_user),
        )
        .route(
            "/api/projects",
            axum::routing::get(project_crud::list_projects)
                .post(project_crud::create_project),
        )
        .route(
            "/api/projects/{id}",
            axum::routing::get(project_crud::get_project)
                .put(project_crud::update_project)
                .delete(project_crud::delete_project),
        )
        .route(
            "/api/projects/{id}/tasks",
            axum::routing::get(tasks::list_tasks).post(tasks::create_task),
        )
        .route(
            "/api/projects/{id}/tasks/{task_id}",
            axum::routing::put(tasks::update_task).delete(tasks::delete_task),
        )
        .route(
            "/api/projects/{id}/messages",
            axum::routing::get(chat::list_project_messages)
                .post(chat::post_project_message),
        )
        .route(
            "/api/messages",
            axum::routing::get(chat::list_global_messages)
                .post(chat::post_global_message),
        )
        .route(
            "/api/projects/{id}/activities",
            axum::routing::get(activity::list_activities).post(activity::post_activity),
        )
        .route(
            "/api/projects/{id}/members",
            axum::routing::get(project_members::list_members),
        )
        .route(
            "/api/projects/{id}/members/{email}",
            axum::routing::delete(project_members::remove_member),
        )
        .route(
            "/api/projects/{id}/invite",
            axum::routing::post(project_members::invite_member),
        )
        .route(
            "/api/projects/{id}/leave",
            axum::routing::post(project_members::leave_project),
        )
        .route(
            "/api/invitations",
            axum::routing::get(invitations::list_invitations),
        )
        .route(
            "/api/invitations/{id}/accept",
            axum::routing::post(invitations::accept_invitation),
        )
        .route(
            "/api/invitations/{id}/decline",
            axum::routing::post(invitations::decline_invitation),
        )
        .route(
            "/api/users/search",
            axum::routing::get(users::search_users),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // WebSocket endpoint (auth via first frame, not at upgrade)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(auth_routes)
        .merge(api_routes)
        .merge(ws_routes)
        .merge(health)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
