// Unified application interface over the record store. Every domain
// operation lives on one Hub value instead of a service per entity, the
// caller hands in an already-resolved viewer profile, and all failures come
// back through the shared error taxonomy.

mod auth;
mod badges;
mod comments;
mod guides;
mod moderation;
mod notifications;
mod posts;
mod social;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::cache::Cache;
use crate::error::{AppError, AppResult};
use crate::models::{collections, Profile};
use crate::store::RecordStore;
use crate::toggle::{self, ToggleController};

const ALLOWED_BUCKETS: &[&str] = &["images", "avatars"];

pub struct Hub {
    store: Arc<dyn RecordStore>,
    votes: ToggleController,
    bookmarks: ToggleController,
    follows: ToggleController,
    count_cache: Arc<Mutex<Cache<String, i64>>>,
}

impl Hub {
    pub async fn new(store: Arc<dyn RecordStore>, cache_capacity: usize) -> AppResult<Self> {
        let hub = Hub {
            votes: ToggleController::new(store.clone(), toggle::VOTES),
            bookmarks: ToggleController::new(store.clone(), toggle::BOOKMARKS),
            follows: ToggleController::new(store.clone(), toggle::FOLLOWS),
            count_cache: Arc::new(Mutex::new(Cache::new(cache_capacity))),
            store,
        };
        hub.seed_badge_catalog().await?;
        Ok(hub)
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    /// Resolves a session token to its profile or rejects the call.
    pub async fn viewer_from_token(&self, token: &str) -> AppResult<Profile> {
        match self.store.current_identity(token).await? {
            Some(user) => crate::models::decode(user),
            None => Err(AppError::NotAuthenticated("please sign in".to_string())),
        }
    }

    /// Like `viewer_from_token` but a stale or missing session reads as an
    /// anonymous viewer instead of a rejection.
    pub async fn maybe_viewer(&self, token: &str) -> AppResult<Option<Profile>> {
        match self.store.current_identity(token).await? {
            Some(user) => Ok(Some(crate::models::decode(user)?)),
            None => Ok(None),
        }
    }

    pub async fn upload(
        &self,
        viewer: &Profile,
        bucket: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> AppResult<String> {
        ensure_not_banned(viewer)?;
        if !ALLOWED_BUCKETS.contains(&bucket) {
            return Err(AppError::Validation(format!("unknown bucket: {}", bucket)));
        }
        if bytes.is_empty() {
            return Err(AppError::Validation("empty upload".to_string()));
        }
        let path = format!(
            "{}/{}-{}",
            viewer.id,
            uuid::Uuid::new_v4(),
            sanitize_filename(filename)
        );
        self.store.upload(bucket, &path, bytes).await
    }

    pub async fn fetch_object(&self, bucket: &str, path: &str) -> AppResult<Option<Vec<u8>>> {
        self.store.fetch_object(bucket, path).await
    }

    async fn ensure_exists(&self, collection: &str, id: &str) -> AppResult<Value> {
        self.store
            .get(collection, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", collection, id)))
    }

    async fn cached_vote_count(&self, post_id: &str) -> AppResult<i64> {
        let key = format!("count:{}:{}", collections::VOTES, post_id);
        {
            let mut cache = self.count_cache.lock().await;
            if let Some(count) = cache.get(&key).copied() {
                return Ok(count);
            }
        }
        let count = self.votes.count_for(post_id).await?;
        self.count_cache.lock().await.insert(key, count);
        Ok(count)
    }

    async fn invalidate_vote_count(&self, post_id: &str) {
        let key = format!("count:{}:{}", collections::VOTES, post_id);
        self.count_cache.lock().await.remove(&key);
    }
}

pub(crate) fn ensure_not_banned(viewer: &Profile) -> AppResult<()> {
    if viewer.is_banned {
        Err(AppError::Forbidden("account is banned".to_string()))
    } else {
        Ok(())
    }
}

pub(crate) fn ensure_owner(viewer: &Profile, owner_id: &str, what: &str) -> AppResult<()> {
    if viewer.id == owner_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("only the author can edit this {}", what)))
    }
}

pub(crate) fn ensure_owner_or_admin(
    viewer: &Profile,
    owner_id: &str,
    what: &str,
) -> AppResult<()> {
    if viewer.id == owner_id || viewer.is_admin {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "only the author or an admin can remove this {}",
            what
        )))
    }
}

pub(crate) fn non_empty(value: &str, what: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(AppError::Validation(format!("{} is required", what)))
    } else {
        Ok(trimmed.to_string())
    }
}

fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Strips fields a caller may never change through a patch.
pub(crate) fn strip_protected(patch: &mut Value, protected: &[&str]) {
    if let Some(fields) = patch.as_object_mut() {
        for key in protected {
            fields.remove(*key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile(id: &str, admin: bool, banned: bool) -> Profile {
        Profile {
            id: id.to_string(),
            username: format!("user_{}", id),
            email: format!("{}@example.com", id),
            bio: None,
            avatar_url: None,
            is_admin: admin,
            is_banned: banned,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn banned_viewers_cannot_create() {
        assert!(ensure_not_banned(&profile("u1", false, false)).is_ok());
        assert!(matches!(
            ensure_not_banned(&profile("u1", false, true)),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn ownership_checks() {
        let owner = profile("u1", false, false);
        let admin = profile("a1", true, false);
        let other = profile("u2", false, false);

        assert!(ensure_owner(&owner, "u1", "post").is_ok());
        assert!(ensure_owner(&admin, "u1", "post").is_err());

        assert!(ensure_owner_or_admin(&owner, "u1", "post").is_ok());
        assert!(ensure_owner_or_admin(&admin, "u1", "post").is_ok());
        assert!(ensure_owner_or_admin(&other, "u1", "post").is_err());
    }

    #[test]
    fn filename_sanitizer_keeps_safe_characters() {
        assert_eq!(sanitize_filename("photo 1.png"), "photo-1.png");
        assert_eq!(sanitize_filename("../../etc"), "..-..-etc");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[test]
    fn strip_protected_removes_only_named_fields() {
        let mut patch = serde_json::json!({"id": "x", "bio": "new", "user_id": "y"});
        strip_protected(&mut patch, &["id", "user_id"]);
        assert!(patch.get("id").is_none());
        assert!(patch.get("user_id").is_none());
        assert_eq!(patch["bio"], "new");
    }
}
