//! Operator API.
//!
//! # Responsibilities
//! - Runtime introspection (status, topic subscriber counts)
//! - Ban moderation (list, create, edit, revoke, history)
//! - Subscriber token issuance
//!
//! # Design Decisions
//! - Routes are always mounted; the auth middleware answers 404 while
//!   `admin.enabled` is false, so toggling the flag via hot reload
//!   takes effect without rebuilding the router.
//! - Every ban write refreshes the in-memory ban cache immediately.
//!   Moderation applies on the next subscribe, not a refresh interval
//!   later.

pub mod auth;
pub mod handlers;

use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;

use crate::http::server::AppState;

use self::auth::require_admin;
use self::handlers::{
    ban_history, create_ban, get_status, get_topics, issue_token, list_bans, revoke_ban,
    update_ban,
};

pub fn admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/topics", get(get_topics))
        .route("/admin/bans", get(list_bans).post(create_ban))
        .route("/admin/bans/{id}", patch(update_ban).delete(revoke_ban))
        .route("/admin/bans/history/{kind}/{subject_id}", get(ban_history))
        .route("/admin/tokens", post(issue_token))
        .route_layer(middleware::from_fn_with_state(state, require_admin))
}
