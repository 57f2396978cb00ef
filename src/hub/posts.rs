use chrono::{Duration, Utc};
use futures::future::try_join_all;
use serde_json::Value;
use tracing::info;

use crate::error::AppResult;
use crate::hub::{ensure_not_banned, ensure_owner, ensure_owner_or_admin, non_empty, strip_protected, Hub};
use crate::models::{collections, decode, decode_all, NewPost, PostView, Profile, RepairPost};
use crate::store::{record_id, Filter, Order};

const TRENDING_WINDOW_DAYS: i64 = 7;
const TRENDING_LIMIT: usize = 10;

impl Hub {
    /// Newest-first feed, optionally narrowed by a search needle over item
    /// name and issue description and by category.
    pub async fn list_posts(
        &self,
        viewer: Option<&Profile>,
        search: Option<&str>,
        category: Option<&str>,
    ) -> AppResult<Vec<PostView>> {
        let mut filter = Filter::new();
        if let Some(category) = category {
            filter = filter.eq("category_id", category);
        }
        if let Some(needle) = search.map(str::trim).filter(|s| !s.is_empty()) {
            filter = filter.contains_any(&["item_name", "issue_description"], needle);
        }
        let records = self
            .store
            .select(collections::REPAIR_POSTS, &filter, &Order::desc("created_at"))
            .await?;
        let posts: Vec<RepairPost> = decode_all(records)?;
        try_join_all(posts.into_iter().map(|post| self.enrich_post(post, viewer))).await
    }

    pub async fn posts_by_user(
        &self,
        viewer: Option<&Profile>,
        user_id: &str,
    ) -> AppResult<Vec<PostView>> {
        let records = self
            .store
            .select(
                collections::REPAIR_POSTS,
                &Filter::new().eq("user_id", user_id),
                &Order::desc("created_at"),
            )
            .await?;
        let posts: Vec<RepairPost> = decode_all(records)?;
        try_join_all(posts.into_iter().map(|post| self.enrich_post(post, viewer))).await
    }

    pub async fn get_post(&self, viewer: Option<&Profile>, id: &str) -> AppResult<PostView> {
        let record = self.ensure_exists(collections::REPAIR_POSTS, id).await?;
        self.enrich_post(decode(record)?, viewer).await
    }

    pub async fn create_post(&self, viewer: &Profile, input: NewPost) -> AppResult<PostView> {
        ensure_not_banned(viewer)?;
        non_empty(&input.item_name, "item name")?;
        if let Some(category_id) = &input.category_id {
            self.ensure_exists(collections::CATEGORIES, category_id).await?;
        }

        let mut document = serde_json::to_value(&input)?;
        if let Some(fields) = document.as_object_mut() {
            fields.insert("user_id".to_string(), Value::String(viewer.id.clone()));
        }
        let record = self.store.insert(collections::REPAIR_POSTS, document).await?;
        let post: RepairPost = decode(record)?;
        info!(post_id = %post.id, user_id = %viewer.id, "created repair post");

        self.award_badges(&viewer.id).await;

        Ok(PostView {
            post,
            vote_count: 0,
            user_has_voted: false,
            user_has_bookmarked: false,
        })
    }

    pub async fn update_post(
        &self,
        viewer: &Profile,
        id: &str,
        mut patch: Value,
    ) -> AppResult<PostView> {
        let record = self.ensure_exists(collections::REPAIR_POSTS, id).await?;
        let post: RepairPost = decode(record)?;
        ensure_owner(viewer, &post.user_id, "post")?;

        strip_protected(&mut patch, &["id", "created_at", "user_id"]);
        let updated = self
            .store
            .update(collections::REPAIR_POSTS, id, patch)
            .await?;
        self.enrich_post(decode(updated)?, Some(viewer)).await
    }

    /// Removes a post and everything hanging off it. The store has no
    /// cascade of its own, so comments, votes and bookmarks are cleaned up
    /// here before the post record goes.
    pub async fn delete_post(&self, viewer: &Profile, id: &str) -> AppResult<()> {
        let record = self.ensure_exists(collections::REPAIR_POSTS, id).await?;
        let post: RepairPost = decode(record)?;
        ensure_owner_or_admin(viewer, &post.user_id, "post")?;

        let related = Filter::new().eq("repair_post_id", id);
        for collection in [collections::COMMENTS, collections::VOTES, collections::BOOKMARKS] {
            let dependents = self
                .store
                .select(collection, &related, &Order::asc("created_at"))
                .await?;
            for dependent in &dependents {
                self.store.delete(collection, &record_id(dependent)?).await?;
            }
        }
        self.store.delete(collections::REPAIR_POSTS, id).await?;
        self.invalidate_vote_count(id).await;
        info!(post_id = %id, user_id = %viewer.id, "deleted repair post");
        Ok(())
    }

    /// Most-voted posts of the last week, capped at ten.
    pub async fn trending(&self, viewer: Option<&Profile>) -> AppResult<Vec<PostView>> {
        let cutoff = Utc::now() - Duration::days(TRENDING_WINDOW_DAYS);
        let records = self
            .store
            .select(
                collections::REPAIR_POSTS,
                &Filter::new(),
                &Order::desc("created_at"),
            )
            .await?;
        let posts: Vec<RepairPost> = decode_all(records)?;
        let recent: Vec<RepairPost> = posts
            .into_iter()
            .filter(|post| post.created_at >= cutoff)
            .collect();

        let mut views =
            try_join_all(recent.into_iter().map(|post| self.enrich_post(post, viewer))).await?;
        views.sort_by(|a, b| {
            b.vote_count
                .cmp(&a.vote_count)
                .then_with(|| b.post.created_at.cmp(&a.post.created_at))
                .then_with(|| a.post.id.cmp(&b.post.id))
        });
        views.truncate(TRENDING_LIMIT);
        Ok(views)
    }

    pub(crate) async fn enrich_post(
        &self,
        post: RepairPost,
        viewer: Option<&Profile>,
    ) -> AppResult<PostView> {
        let vote_count = self.cached_vote_count(&post.id).await?;
        let (user_has_voted, user_has_bookmarked) = match viewer {
            Some(viewer) => (
                self.votes.is_active(&viewer.id, &post.id).await?,
                self.bookmarks.is_active(&viewer.id, &post.id).await?,
            ),
            None => (false, false),
        };
        Ok(PostView {
            post,
            vote_count,
            user_has_voted,
            user_has_bookmarked,
        })
    }
}
