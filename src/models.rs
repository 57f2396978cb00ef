// Typed views over the JSON documents held by the record store. Field names
// are the stable schema surface shared with every client; renaming one is a
// breaking change even though the store itself would not notice.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// Collection names as the store knows them.
pub mod collections {
    pub const PROFILES: &str = "profiles";
    pub const CATEGORIES: &str = "categories";
    pub const REPAIR_POSTS: &str = "repair_posts";
    pub const COMMENTS: &str = "comments";
    pub const GUIDES: &str = "guides";
    pub const VOTES: &str = "votes";
    pub const BOOKMARKS: &str = "bookmarks";
    pub const FOLLOWS: &str = "follows";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const REPORTS: &str = "reports";
    pub const BADGES: &str = "badges";
    pub const USER_BADGES: &str = "user_badges";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairPost {
    pub id: String,
    pub user_id: String,
    pub item_name: String,
    #[serde(default)]
    pub issue_description: Option<String>,
    #[serde(default)]
    pub repair_steps: Option<String>,
    pub success: bool,
    pub date: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A post as the feed renders it: the record plus derived fields. The vote
/// count is always recomputed from the votes collection, never stored on the
/// post itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: RepairPost,
    pub vote_count: i64,
    pub user_has_voted: bool,
    pub user_has_bookmarked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub repair_post_id: String,
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub date: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guide {
    pub id: String,
    pub user_id: String,
    pub item_name: String,
    pub guide_content: String,
    pub date: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    pub user_id: String,
    pub repair_post_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub user_id: String,
    pub repair_post_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follow {
    pub id: String,
    pub follower_id: String,
    pub followed_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Upvote,
    Comment,
    Reply,
    Follow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    /// Recipient.
    pub user_id: String,
    pub actor_id: String,
    pub kind: NotificationKind,
    #[serde(default)]
    pub repair_post_id: Option<String>,
    #[serde(default)]
    pub comment_id: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportTargetType {
    Post,
    Comment,
    Guide,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportReason {
    Spam,
    Inappropriate,
    Harassment,
    Misinformation,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Open,
    Resolved,
    Dismissed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub reporter_id: String,
    pub target_type: ReportTargetType,
    pub target_id: String,
    pub reason: ReportReason,
    #[serde(default)]
    pub description: Option<String>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Badge {
    pub id: String,
    /// Stable handle, e.g. `first-repair`.
    pub slug: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBadge {
    pub id: String,
    pub user_id: String,
    pub badge_id: String,
    pub created_at: DateTime<Utc>,
}

// Inputs accepted by the hub. The store assigns `id` and `created_at`.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub item_name: String,
    #[serde(default)]
    pub issue_description: Option<String>,
    #[serde(default)]
    pub repair_steps: Option<String>,
    pub success: bool,
    pub date: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub category_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGuide {
    pub item_name: String,
    pub guide_content: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReport {
    pub target_type: ReportTargetType,
    pub target_id: String,
    pub reason: ReportReason,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_users: u64,
    pub total_posts: u64,
    pub total_guides: u64,
    pub total_comments: u64,
}

/// Outcome of a vote/bookmark/follow toggle: the new membership state and a
/// fresh count for the target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ToggleOutcome {
    pub active: bool,
    pub count: i64,
}

/// Acknowledgement of a comment deletion, carrying every id the cascade
/// removed so a client cache can drop exactly the same set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentDeletion {
    pub repair_post_id: String,
    pub deleted_ids: Vec<String>,
}

pub fn decode<T: DeserializeOwned>(value: Value) -> AppResult<T> {
    serde_json::from_value(value)
        .map_err(|e| AppError::Internal(format!("malformed record: {}", e)))
}

pub fn decode_all<T: DeserializeOwned>(values: Vec<Value>) -> AppResult<Vec<T>> {
    values.into_iter().map(decode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn profile_decodes_with_defaults() {
        let profile: Profile = decode(json!({
            "id": "u1",
            "username": "alice",
            "email": "alice@example.com",
            "created_at": "2024-01-10T08:00:00Z"
        }))
        .unwrap();
        assert!(!profile.is_admin);
        assert!(!profile.is_banned);
        assert!(profile.bio.is_none());
    }

    #[test]
    fn post_view_flattens_record_fields() {
        let view = PostView {
            post: RepairPost {
                id: "p1".to_string(),
                user_id: "u1".to_string(),
                item_name: "iPhone 13".to_string(),
                issue_description: Some("Cracked screen".to_string()),
                repair_steps: None,
                success: true,
                date: "2024-01-15".to_string(),
                images: vec![],
                category_id: None,
                created_at: Utc::now(),
            },
            vote_count: 3,
            user_has_voted: true,
            user_has_bookmarked: false,
        };
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["item_name"], "iPhone 13");
        assert_eq!(value["vote_count"], 3);
        assert_eq!(value["user_has_voted"], true);
    }

    #[test]
    fn notification_kind_round_trips_lowercase() {
        let value = serde_json::to_value(NotificationKind::Reply).unwrap();
        assert_eq!(value, json!("reply"));
        let kind: NotificationKind = serde_json::from_value(json!("upvote")).unwrap();
        assert_eq!(kind, NotificationKind::Upvote);
    }

    #[test]
    fn decode_surfaces_malformed_records() {
        let result: AppResult<Comment> = decode(json!({"id": "c1"}));
        assert!(result.is_err());
    }
}
