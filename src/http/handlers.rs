//! Request handlers. Each one is a thin shim that parses the request,
//! hands the work to the hub and serializes the result.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::http::extract::{bearer_token, MaybeViewer, Viewer};
use crate::models::{
    AdminStats, Badge, Category, Comment, CommentDeletion, Guide, NewGuide, NewPost, NewReport,
    Notification, PostView, Profile, Report, ReportStatus, ToggleOutcome,
};
use crate::thread::CommentNode;

// Request bodies

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct PostQuery {
    pub search: Option<String>,
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct GuideQuery {
    pub search: Option<String>,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CategoryRequest {
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Deserialize)]
pub struct ResolveReportRequest {
    pub status: ReportStatus,
}

#[derive(Deserialize)]
pub struct BanRequest {
    pub banned: bool,
}

// Auth

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<Value>> {
    let (token, user) = state
        .hub
        .register(&req.email, &req.username, &req.password)
        .await?;
    Ok(Json(json!({ "token": token, "user": user })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<Value>> {
    let (token, user) = state.hub.login(&req.email, &req.password).await?;
    Ok(Json(json!({ "token": token, "user": user })))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    if let Some(token) = bearer_token(&headers) {
        state.hub.logout(&token).await?;
    }
    Ok(Json(json!({ "ok": true })))
}

pub async fn me(MaybeViewer(viewer): MaybeViewer) -> Json<Value> {
    Json(json!({ "user": viewer }))
}

// Users and profiles

pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(state.hub.list_users().await?))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let user = state.hub.get_user(&id).await?;
    let (follower_count, following_count) = futures::try_join!(
        state.hub.follower_count(&id),
        state.hub.following_count(&id),
    )?;
    Ok(Json(json!({
        "user": user,
        "follower_count": follower_count,
        "following_count": following_count,
    })))
}

pub async fn user_posts(
    State(state): State<AppState>,
    MaybeViewer(viewer): MaybeViewer,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<PostView>>> {
    Ok(Json(state.hub.posts_by_user(viewer.as_ref(), &id).await?))
}

pub async fn user_badges(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Badge>>> {
    Ok(Json(state.hub.badges_for(&id).await?))
}

pub async fn user_followers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(state.hub.followers(&id).await?))
}

pub async fn user_following(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(state.hub.following(&id).await?))
}

pub async fn follow_user(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
) -> AppResult<Json<ToggleOutcome>> {
    Ok(Json(state.hub.toggle_follow(&viewer, &id).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Json(patch): Json<Value>,
) -> AppResult<Json<Profile>> {
    Ok(Json(state.hub.update_profile(&viewer, patch).await?))
}

// Posts

pub async fn list_posts(
    State(state): State<AppState>,
    MaybeViewer(viewer): MaybeViewer,
    Query(params): Query<PostQuery>,
) -> AppResult<Json<Vec<PostView>>> {
    let posts = state
        .hub
        .list_posts(
            viewer.as_ref(),
            params.search.as_deref(),
            params.category.as_deref(),
        )
        .await?;
    Ok(Json(posts))
}

pub async fn trending_posts(
    State(state): State<AppState>,
    MaybeViewer(viewer): MaybeViewer,
) -> AppResult<Json<Vec<PostView>>> {
    Ok(Json(state.hub.trending(viewer.as_ref()).await?))
}

pub async fn get_post(
    State(state): State<AppState>,
    MaybeViewer(viewer): MaybeViewer,
    Path(id): Path<String>,
) -> AppResult<Json<PostView>> {
    Ok(Json(state.hub.get_post(viewer.as_ref(), &id).await?))
}

pub async fn create_post(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Json(input): Json<NewPost>,
) -> AppResult<Json<PostView>> {
    Ok(Json(state.hub.create_post(&viewer, input).await?))
}

pub async fn update_post(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> AppResult<Json<PostView>> {
    Ok(Json(state.hub.update_post(&viewer, &id, patch).await?))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.hub.delete_post(&viewer, &id).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn vote_post(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
) -> AppResult<Json<ToggleOutcome>> {
    Ok(Json(state.hub.toggle_vote(&viewer, &id).await?))
}

pub async fn bookmark_post(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
) -> AppResult<Json<ToggleOutcome>> {
    Ok(Json(state.hub.toggle_bookmark(&viewer, &id).await?))
}

pub async fn list_bookmarks(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
) -> AppResult<Json<Vec<PostView>>> {
    Ok(Json(state.hub.bookmarked_posts(&viewer).await?))
}

// Comments

pub async fn post_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Comment>>> {
    Ok(Json(state.hub.comments_for_post(&id).await?))
}

pub async fn post_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<CommentNode>>> {
    Ok(Json(state.hub.thread_for_post(&id).await?))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> AppResult<Json<Comment>> {
    let comment = state
        .hub
        .add_comment(&viewer, &id, &req.content, req.parent_id.as_deref())
        .await?;
    Ok(Json(comment))
}

pub async fn update_comment(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> AppResult<Json<Comment>> {
    Ok(Json(state.hub.update_comment(&viewer, &id, &req.content).await?))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
) -> AppResult<Json<CommentDeletion>> {
    Ok(Json(state.hub.delete_comment(&viewer, &id).await?))
}

// Guides

pub async fn list_guides(
    State(state): State<AppState>,
    Query(params): Query<GuideQuery>,
) -> AppResult<Json<Vec<Guide>>> {
    Ok(Json(state.hub.list_guides(params.search.as_deref()).await?))
}

pub async fn get_guide(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Guide>> {
    Ok(Json(state.hub.get_guide(&id).await?))
}

pub async fn create_guide(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Json(input): Json<NewGuide>,
) -> AppResult<Json<Guide>> {
    Ok(Json(state.hub.create_guide(&viewer, input).await?))
}

pub async fn update_guide(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> AppResult<Json<Guide>> {
    Ok(Json(state.hub.update_guide(&viewer, &id, patch).await?))
}

pub async fn delete_guide(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.hub.delete_guide(&viewer, &id).await?;
    Ok(Json(json!({ "ok": true })))
}

// Categories

pub async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(state.hub.list_categories().await?))
}

pub async fn create_category(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Json(req): Json<CategoryRequest>,
) -> AppResult<Json<Category>> {
    Ok(Json(
        state
            .hub
            .create_category(&viewer, &req.name, req.icon.as_deref())
            .await?,
    ))
}

pub async fn update_category(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> AppResult<Json<Category>> {
    Ok(Json(state.hub.update_category(&viewer, &id, patch).await?))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.hub.delete_category(&viewer, &id).await?;
    Ok(Json(json!({ "ok": true })))
}

// Notifications

pub async fn list_notifications(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
) -> AppResult<Json<Vec<Notification>>> {
    Ok(Json(state.hub.notifications_for(&viewer).await?))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
) -> AppResult<Json<Value>> {
    let count = state.hub.unread_count(&viewer).await?;
    Ok(Json(json!({ "count": count })))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
) -> AppResult<Json<Notification>> {
    Ok(Json(state.hub.mark_read(&viewer, &id).await?))
}

pub async fn mark_all_notifications_read(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
) -> AppResult<Json<Value>> {
    let updated = state.hub.mark_all_read(&viewer).await?;
    Ok(Json(json!({ "updated": updated })))
}

// Reports and admin

pub async fn submit_report(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Json(input): Json<NewReport>,
) -> AppResult<Json<Report>> {
    Ok(Json(state.hub.submit_report(&viewer, input).await?))
}

pub async fn list_reports(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
) -> AppResult<Json<Vec<Report>>> {
    Ok(Json(state.hub.list_reports(&viewer).await?))
}

pub async fn resolve_report(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
    Json(req): Json<ResolveReportRequest>,
) -> AppResult<Json<Report>> {
    Ok(Json(state.hub.resolve_report(&viewer, &id, req.status).await?))
}

pub async fn admin_stats(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
) -> AppResult<Json<AdminStats>> {
    Ok(Json(state.hub.stats(&viewer).await?))
}

pub async fn ban_user(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path(id): Path<String>,
    Json(req): Json<BanRequest>,
) -> AppResult<Json<Profile>> {
    Ok(Json(state.hub.set_banned(&viewer, &id, req.banned).await?))
}

// Storage

pub async fn upload_object(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    Path((bucket, filename)): Path<(String, String)>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let url = state
        .hub
        .upload(&viewer, &bucket, &filename, body.to_vec())
        .await?;
    Ok(Json(json!({ "url": url })))
}

pub async fn serve_object(
    State(state): State<AppState>,
    Path((bucket, path)): Path<(String, String)>,
) -> AppResult<Response> {
    let bytes = state
        .hub
        .fetch_object(&bucket, &path)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no such object: {}/{}", bucket, path)))?;
    Ok(([(header::CONTENT_TYPE, content_type_for(&path))], bytes).into_response())
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn content_type_for(path: &str) -> &'static str {
    let extension = path.rsplit('.').next().map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}
