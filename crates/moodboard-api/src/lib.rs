//! HTTP surface over the MoodBoard data-access layer.

pub mod auth;
pub mod error;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod search;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use moodboard_core::MoodBoard;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub board: MoodBoard,
    /// How often a notification stream re-polls on top of push updates.
    pub notification_poll: Duration,
}

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/feed", get(posts::get_feed))
        .route("/posts", post(posts::create_post))
        .route("/posts/{post_id}", get(posts::get_post).delete(posts::delete_post))
        .route("/posts/{post_id}/like", post(posts::toggle_like))
        .route("/posts/{post_id}/comments", post(posts::add_comment))
        .route("/users/me", get(users::get_me).put(users::update_me))
        .route("/users/{user_id}", get(users::get_profile))
        .route("/users/{user_id}/posts", get(users::list_posts))
        .route("/users/{user_id}/friends", get(users::list_friends))
        .route("/users/{user_id}/relationship", get(users::relationship))
        .route(
            "/users/{user_id}/friend-request",
            post(users::send_friend_request).delete(users::cancel_friend_request),
        )
        .route("/friend-requests/{request_id}/respond", post(users::respond_friend_request))
        .route("/notifications", get(notifications::list_unread))
        .route("/notifications/stream", get(notifications::stream))
        .route("/notifications/{notification_id}/read", post(notifications::mark_read))
        .route("/search/users", get(search::users))
        .route("/search/posts", get(search::posts))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}
