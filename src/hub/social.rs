use tracing::info;

use crate::error::{AppError, AppResult};
use crate::hub::Hub;
use crate::models::{
    collections, decode, decode_all, Bookmark, Follow, NotificationKind, PostView, Profile,
    RepairPost, ToggleOutcome,
};
use crate::store::{Filter, Order};

impl Hub {
    /// Vote toggle. The controller serializes double submits and recounts
    /// from the store; this layer checks the target, drops the cached count
    /// and pings the post owner when a vote lands.
    pub async fn toggle_vote(&self, viewer: &Profile, post_id: &str) -> AppResult<ToggleOutcome> {
        let post: RepairPost = decode(self.ensure_exists(collections::REPAIR_POSTS, post_id).await?)?;
        let outcome = self.votes.toggle(&viewer.id, post_id).await?;
        self.invalidate_vote_count(post_id).await;
        if outcome.active {
            self.notify(
                &post.user_id,
                &viewer.id,
                NotificationKind::Upvote,
                Some(post_id),
                None,
            )
            .await;
        }
        info!(post_id = %post_id, user_id = %viewer.id, active = outcome.active, "toggled vote");
        Ok(outcome)
    }

    pub async fn toggle_bookmark(
        &self,
        viewer: &Profile,
        post_id: &str,
    ) -> AppResult<ToggleOutcome> {
        self.ensure_exists(collections::REPAIR_POSTS, post_id).await?;
        self.bookmarks.toggle(&viewer.id, post_id).await
    }

    pub async fn toggle_follow(&self, viewer: &Profile, user_id: &str) -> AppResult<ToggleOutcome> {
        if viewer.id == user_id {
            return Err(AppError::Validation("you cannot follow yourself".to_string()));
        }
        self.ensure_exists(collections::PROFILES, user_id).await?;
        let outcome = self.follows.toggle(&viewer.id, user_id).await?;
        if outcome.active {
            self.notify(user_id, &viewer.id, NotificationKind::Follow, None, None)
                .await;
        }
        Ok(outcome)
    }

    pub async fn has_voted(&self, viewer: &Profile, post_id: &str) -> AppResult<bool> {
        self.votes.is_active(&viewer.id, post_id).await
    }

    pub async fn has_bookmarked(&self, viewer: &Profile, post_id: &str) -> AppResult<bool> {
        self.bookmarks.is_active(&viewer.id, post_id).await
    }

    pub async fn is_following(&self, viewer: &Profile, user_id: &str) -> AppResult<bool> {
        self.follows.is_active(&viewer.id, user_id).await
    }

    pub async fn vote_count(&self, post_id: &str) -> AppResult<i64> {
        self.cached_vote_count(post_id).await
    }

    pub async fn follower_count(&self, user_id: &str) -> AppResult<i64> {
        self.follows.count_for(user_id).await
    }

    pub async fn following_count(&self, user_id: &str) -> AppResult<i64> {
        let count = self
            .store
            .count(
                collections::FOLLOWS,
                &Filter::new().eq("follower_id", user_id),
            )
            .await?;
        Ok(count as i64)
    }

    /// Profiles following `user_id`, oldest follow first.
    pub async fn followers(&self, user_id: &str) -> AppResult<Vec<Profile>> {
        let follows: Vec<Follow> = decode_all(
            self.store
                .select(
                    collections::FOLLOWS,
                    &Filter::new().eq("followed_id", user_id),
                    &Order::asc("created_at"),
                )
                .await?,
        )?;
        let mut profiles = Vec::with_capacity(follows.len());
        for follow in follows {
            if let Some(record) = self.store.get(collections::PROFILES, &follow.follower_id).await? {
                profiles.push(decode(record)?);
            }
        }
        Ok(profiles)
    }

    pub async fn following(&self, user_id: &str) -> AppResult<Vec<Profile>> {
        let follows: Vec<Follow> = decode_all(
            self.store
                .select(
                    collections::FOLLOWS,
                    &Filter::new().eq("follower_id", user_id),
                    &Order::asc("created_at"),
                )
                .await?,
        )?;
        let mut profiles = Vec::with_capacity(follows.len());
        for follow in follows {
            if let Some(record) = self.store.get(collections::PROFILES, &follow.followed_id).await? {
                profiles.push(decode(record)?);
            }
        }
        Ok(profiles)
    }

    /// The viewer's saved posts, newest bookmark first. A bookmark whose
    /// post has since been removed is skipped rather than surfaced as an
    /// error.
    pub async fn bookmarked_posts(&self, viewer: &Profile) -> AppResult<Vec<PostView>> {
        let bookmarks: Vec<Bookmark> = decode_all(
            self.store
                .select(
                    collections::BOOKMARKS,
                    &Filter::new().eq("user_id", viewer.id.as_str()),
                    &Order::desc("created_at"),
                )
                .await?,
        )?;
        let mut views = Vec::with_capacity(bookmarks.len());
        for bookmark in bookmarks {
            let Some(record) = self
                .store
                .get(collections::REPAIR_POSTS, &bookmark.repair_post_id)
                .await?
            else {
                continue;
            };
            views.push(self.enrich_post(decode(record)?, Some(viewer)).await?);
        }
        Ok(views)
    }
}
