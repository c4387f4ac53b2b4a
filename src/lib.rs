//! GroupTask collaboration server: project and task management with
//! per-project chat and a WebSocket push layer that keeps every connected
//! client current without polling.
//!
//! The crate is a library so integration tests can stand up the full
//! router and liveness monitor in-process; the binary in `main.rs` is a
//! thin wrapper around [`routes::build_router`].

pub mod activity;
pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod db;
pub mod invitations;
pub mod projects;
pub mod routes;
pub mod state;
pub mod tasks;
pub mod users;
pub mod ws;
