//! API layer
//!
//! HTTP handlers for:
//! - Accounts and sessions
//! - Circles, membership, and invitations
//! - Posts: feeds, ballots, seen marks, chat
//! - Notifications
//! - Metrics (Prometheus)

mod auth;
mod chat;
mod circles;
mod dto;
mod feed;
mod invitations;
pub mod metrics;
mod notifications;
mod posts;

pub use dto::*;
pub use metrics::metrics_router;

use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

use crate::AppState;

/// Create the `/api` router.
///
/// There is no route-level auth layer: handlers that need a caller use
/// the `CurrentUser` extractor, and reads that also serve anonymous
/// viewers use `MaybeUser`.
pub fn api_router() -> Router<AppState> {
    Router::new()
        // Accounts and sessions
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        // Circles
        .route("/circles", post(circles::create_circle))
        .route("/circles", get(circles::list_my_circles))
        .route("/circles/:id", get(circles::get_circle))
        .route("/circles/:id", patch(circles::update_circle))
        .route("/circles/:id", delete(circles::delete_circle))
        .route("/circles/:id/leave", post(circles::leave_circle))
        .route(
            "/circles/:id/members/:user_id/role",
            put(circles::set_member_role),
        )
        .route(
            "/circles/:id/members/:user_id",
            delete(circles::remove_member),
        )
        // Invite links and direct invitations
        .route("/circles/:id/invites", post(invitations::create_invite_token))
        .route("/invites/:token", get(invitations::inspect_invite_token))
        .route("/invites/:token/join", post(invitations::redeem_invite_token))
        .route("/circles/:id/invitations", post(invitations::invite_user))
        .route("/invitations", get(invitations::list_my_invitations))
        .route(
            "/invitations/:id/respond",
            post(invitations::respond_to_invitation),
        )
        // Posts and feeds
        .route("/circles/:id/posts", post(posts::create_post))
        .route("/circles/:id/posts", get(feed::circle_feed))
        .route("/feed", get(feed::home_feed))
        .route("/posts/:id", delete(posts::delete_post))
        .route("/posts/:id/vote", post(posts::vote))
        .route("/posts/:id/seen", post(posts::mark_seen))
        .route("/posts/:id/seen", get(posts::seen_status))
        // Chat
        .route("/posts/:id/chat/messages", get(chat::list_messages))
        .route("/posts/:id/chat/messages", post(chat::send_message))
        .route("/posts/:id/chat/participants", get(chat::get_participants))
        .route(
            "/posts/:id/chat/participants",
            put(chat::replace_participants),
        )
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/:id/read", post(notifications::mark_read))
        .route("/notifications/read-all", post(notifications::mark_all_read))
}
