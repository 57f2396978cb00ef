//! HTTP surface. Routes are a direct mapping onto hub operations; all
//! policy (ownership, bans, admin checks) lives behind them in the hub.

pub mod extract;
pub mod handlers;

use axum::routing::{delete, get, patch, post};
use axum::Router;

use crate::app_state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Auth
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/auth/me", get(handlers::me))
        // Users
        .route("/api/users", get(handlers::list_users))
        .route("/api/users/{id}", get(handlers::get_user))
        .route("/api/users/{id}/posts", get(handlers::user_posts))
        .route("/api/users/{id}/badges", get(handlers::user_badges))
        .route("/api/users/{id}/followers", get(handlers::user_followers))
        .route("/api/users/{id}/following", get(handlers::user_following))
        .route("/api/users/{id}/follow", post(handlers::follow_user))
        .route("/api/profile", patch(handlers::update_profile))
        // Repair posts
        .route("/api/posts", get(handlers::list_posts))
        .route("/api/posts", post(handlers::create_post))
        .route("/api/posts/trending", get(handlers::trending_posts))
        .route("/api/posts/{id}", get(handlers::get_post))
        .route("/api/posts/{id}", patch(handlers::update_post))
        .route("/api/posts/{id}", delete(handlers::delete_post))
        .route("/api/posts/{id}/comments", get(handlers::post_comments))
        .route("/api/posts/{id}/comments", post(handlers::add_comment))
        .route("/api/posts/{id}/thread", get(handlers::post_thread))
        .route("/api/posts/{id}/vote", post(handlers::vote_post))
        .route("/api/posts/{id}/bookmark", post(handlers::bookmark_post))
        .route("/api/bookmarks", get(handlers::list_bookmarks))
        // Comments
        .route("/api/comments/{id}", patch(handlers::update_comment))
        .route("/api/comments/{id}", delete(handlers::delete_comment))
        // Guides
        .route("/api/guides", get(handlers::list_guides))
        .route("/api/guides", post(handlers::create_guide))
        .route("/api/guides/{id}", get(handlers::get_guide))
        .route("/api/guides/{id}", patch(handlers::update_guide))
        .route("/api/guides/{id}", delete(handlers::delete_guide))
        // Categories
        .route("/api/categories", get(handlers::list_categories))
        .route("/api/categories", post(handlers::create_category))
        .route("/api/categories/{id}", patch(handlers::update_category))
        .route("/api/categories/{id}", delete(handlers::delete_category))
        // Notifications
        .route("/api/notifications", get(handlers::list_notifications))
        .route("/api/notifications/unread_count", get(handlers::unread_count))
        .route(
            "/api/notifications/read_all",
            post(handlers::mark_all_notifications_read),
        )
        .route(
            "/api/notifications/{id}/read",
            post(handlers::mark_notification_read),
        )
        // Reports and moderation
        .route("/api/reports", post(handlers::submit_report))
        .route("/api/reports", get(handlers::list_reports))
        .route("/api/reports/{id}", patch(handlers::resolve_report))
        .route("/api/admin/stats", get(handlers::admin_stats))
        .route("/api/admin/users/{id}/ban", post(handlers::ban_user))
        // Storage
        .route(
            "/api/storage/{bucket}/{filename}",
            post(handlers::upload_object),
        )
        .route("/storage/{bucket}/{*path}", get(handlers::serve_object))
        // Health
        .route("/health", get(handlers::health))
        .with_state(state)
}
