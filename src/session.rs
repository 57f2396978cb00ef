//! Client-side working set kept in front of the hub.
//!
//! A session holds the signed-in viewer plus cached slices of the data it
//! has already seen (users, posts, guides, per-post comment lists). Every
//! mutation awaits the hub first and applies the matching local transform
//! only after the acknowledged result comes back, so a failed call leaves
//! the cached state exactly as it was. Each transform is guarded by an
//! epoch captured before the await: sign-out and sign-in bump the epoch,
//! and a result that crossed that boundary is returned to the caller but
//! never applied to the torn-down state.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::cache::Cache;
use crate::error::{AppError, AppResult};
use crate::hub::Hub;
use crate::models::{
    Comment, CommentDeletion, Guide, NewGuide, NewPost, Notification, PostView, Profile,
    ToggleOutcome,
};
use crate::thread::{self, CommentNode};

const THREAD_CACHE_CAPACITY: usize = 64;

pub struct Session {
    hub: Arc<Hub>,
    state: Mutex<SessionState>,
}

struct SessionState {
    epoch: u64,
    token: Option<String>,
    viewer: Option<Profile>,
    users: Vec<Profile>,
    posts: Vec<PostView>,
    guides: Vec<Guide>,
    threads: Cache<String, Vec<Comment>>,
}

impl Session {
    pub fn new(hub: Arc<Hub>) -> Self {
        Session {
            hub,
            state: Mutex::new(SessionState {
                epoch: 0,
                token: None,
                viewer: None,
                users: Vec::new(),
                posts: Vec::new(),
                guides: Vec::new(),
                threads: Cache::new(THREAD_CACHE_CAPACITY),
            }),
        }
    }

    // ---- lifecycle -------------------------------------------------------

    pub async fn register(&self, email: &str, username: &str, password: &str) -> AppResult<Profile> {
        let (token, profile) = self.hub.register(email, username, password).await?;
        self.begin_identity(token, profile.clone()).await;
        self.refresh().await;
        Ok(profile)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<Profile> {
        let (token, profile) = self.hub.login(email, password).await?;
        self.begin_identity(token, profile.clone()).await;
        self.refresh().await;
        Ok(profile)
    }

    /// Tears the local state down first, then revokes the server session.
    /// Bumping the epoch before anything else guarantees that an operation
    /// still in flight for the old identity can never repopulate the
    /// cleared caches, and a failed revoke still leaves the client signed
    /// out.
    pub async fn sign_out(&self) {
        let token = {
            let mut state = self.state.lock().await;
            state.epoch += 1;
            state.viewer = None;
            state.users.clear();
            state.posts.clear();
            state.guides.clear();
            state.threads.clear();
            state.token.take()
        };
        if let Some(token) = token {
            if let Err(err) = self.hub.logout(&token).await {
                warn!(error = %err, "server side sign-out failed");
            }
        }
    }

    /// Full reload of every cached slice. Slices are fetched independently
    /// so one failing collection keeps its previous contents instead of
    /// blanking the whole session. This is the only path that reconciles
    /// the cache with writes made by other users.
    pub async fn refresh(&self) {
        let (epoch, viewer) = {
            let state = self.state.lock().await;
            (state.epoch, state.viewer.clone())
        };

        match self.hub.list_users().await {
            Ok(users) => self.apply(epoch, |state| state.users = users).await,
            Err(err) => warn!(error = %err, "user refresh failed, keeping previous list"),
        }
        match self.hub.list_posts(viewer.as_ref(), None, None).await {
            Ok(posts) => self.apply(epoch, |state| state.posts = posts).await,
            Err(err) => warn!(error = %err, "post refresh failed, keeping previous list"),
        }
        match self.hub.list_guides(None).await {
            Ok(guides) => self.apply(epoch, |state| state.guides = guides).await,
            Err(err) => warn!(error = %err, "guide refresh failed, keeping previous list"),
        }
        // Cached comment lists may be arbitrarily stale at this point, so
        // they are dropped and rebuilt on the next view.
        self.apply(epoch, |state| state.threads.clear()).await;
    }

    // ---- snapshots -------------------------------------------------------

    pub async fn viewer(&self) -> Option<Profile> {
        self.state.lock().await.viewer.clone()
    }

    pub async fn users(&self) -> Vec<Profile> {
        self.state.lock().await.users.clone()
    }

    pub async fn posts(&self) -> Vec<PostView> {
        self.state.lock().await.posts.clone()
    }

    pub async fn guides(&self) -> Vec<Guide> {
        self.state.lock().await.guides.clone()
    }

    // ---- posts -----------------------------------------------------------

    pub async fn create_post(&self, input: NewPost) -> AppResult<PostView> {
        let (epoch, viewer) = self.authed().await?;
        let view = self.hub.create_post(&viewer, input).await?;
        let stored = view.clone();
        self.apply(epoch, move |state| state.posts.insert(0, stored))
            .await;
        Ok(view)
    }

    pub async fn update_post(&self, id: &str, patch: Value) -> AppResult<PostView> {
        let (epoch, viewer) = self.authed().await?;
        let view = self.hub.update_post(&viewer, id, patch).await?;
        let stored = view.clone();
        self.apply(epoch, move |state| {
            if let Some(slot) = state.posts.iter_mut().find(|p| p.post.id == stored.post.id) {
                *slot = stored;
            }
        })
        .await;
        Ok(view)
    }

    pub async fn delete_post(&self, id: &str) -> AppResult<()> {
        let (epoch, viewer) = self.authed().await?;
        self.hub.delete_post(&viewer, id).await?;
        let doomed = id.to_string();
        self.apply(epoch, move |state| {
            state.posts.retain(|p| p.post.id != doomed);
            state.threads.remove(&doomed);
        })
        .await;
        Ok(())
    }

    // ---- comments --------------------------------------------------------

    /// Returns the comment forest for a post, serving from the cached flat
    /// list when one is present and fetching otherwise. The tree shape is
    /// recomputed from the flat list on every call, so transforms only ever
    /// have to maintain the list.
    pub async fn view_thread(&self, post_id: &str) -> AppResult<Vec<CommentNode>> {
        let epoch = {
            let mut state = self.state.lock().await;
            if let Some(comments) = state.threads.get(&post_id.to_string()) {
                return Ok(thread::build(comments));
            }
            state.epoch
        };
        let comments = self.hub.comments_for_post(post_id).await?;
        let forest = thread::build(&comments);
        let key = post_id.to_string();
        self.apply(epoch, move |state| {
            state.threads.insert(key, comments);
        })
        .await;
        Ok(forest)
    }

    pub async fn add_comment(
        &self,
        post_id: &str,
        content: &str,
        parent_id: Option<&str>,
    ) -> AppResult<Comment> {
        let (epoch, viewer) = self.authed().await?;
        let comment = self
            .hub
            .add_comment(&viewer, post_id, content, parent_id)
            .await?;
        let stored = comment.clone();
        self.apply(epoch, move |state| {
            if let Some(list) = state.threads.get_mut(&stored.repair_post_id) {
                list.push(stored);
            }
        })
        .await;
        Ok(comment)
    }

    pub async fn update_comment(&self, id: &str, content: &str) -> AppResult<Comment> {
        let (epoch, viewer) = self.authed().await?;
        let comment = self.hub.update_comment(&viewer, id, content).await?;
        let stored = comment.clone();
        self.apply(epoch, move |state| {
            if let Some(list) = state.threads.get_mut(&stored.repair_post_id) {
                if let Some(slot) = list.iter_mut().find(|c| c.id == stored.id) {
                    *slot = stored;
                }
            }
        })
        .await;
        Ok(comment)
    }

    /// Applies the same cascade the hub performed: every id the server
    /// reports deleted is dropped from the cached list, replies included.
    pub async fn delete_comment(&self, id: &str) -> AppResult<CommentDeletion> {
        let (epoch, viewer) = self.authed().await?;
        let deletion = self.hub.delete_comment(&viewer, id).await?;
        let outcome = deletion.clone();
        self.apply(epoch, move |state| {
            if let Some(list) = state.threads.get_mut(&outcome.repair_post_id) {
                let doomed: HashSet<&str> =
                    outcome.deleted_ids.iter().map(String::as_str).collect();
                list.retain(|c| !doomed.contains(c.id.as_str()));
            }
        })
        .await;
        Ok(deletion)
    }

    // ---- guides ----------------------------------------------------------

    pub async fn create_guide(&self, input: NewGuide) -> AppResult<Guide> {
        let (epoch, viewer) = self.authed().await?;
        let guide = self.hub.create_guide(&viewer, input).await?;
        let stored = guide.clone();
        self.apply(epoch, move |state| state.guides.insert(0, stored))
            .await;
        Ok(guide)
    }

    pub async fn update_guide(&self, id: &str, patch: Value) -> AppResult<Guide> {
        let (epoch, viewer) = self.authed().await?;
        let guide = self.hub.update_guide(&viewer, id, patch).await?;
        let stored = guide.clone();
        self.apply(epoch, move |state| {
            if let Some(slot) = state.guides.iter_mut().find(|g| g.id == stored.id) {
                *slot = stored;
            }
        })
        .await;
        Ok(guide)
    }

    pub async fn delete_guide(&self, id: &str) -> AppResult<()> {
        let (epoch, viewer) = self.authed().await?;
        self.hub.delete_guide(&viewer, id).await?;
        let doomed = id.to_string();
        self.apply(epoch, move |state| state.guides.retain(|g| g.id != doomed))
            .await;
        Ok(())
    }

    // ---- profile and social ----------------------------------------------

    pub async fn update_profile(&self, patch: Value) -> AppResult<Profile> {
        let (epoch, viewer) = self.authed().await?;
        let updated = self.hub.update_profile(&viewer, patch).await?;
        let stored = updated.clone();
        self.apply(epoch, move |state| {
            if let Some(slot) = state.users.iter_mut().find(|u| u.id == stored.id) {
                *slot = stored.clone();
            }
            state.viewer = Some(stored);
        })
        .await;
        Ok(updated)
    }

    pub async fn toggle_vote(&self, post_id: &str) -> AppResult<ToggleOutcome> {
        let (epoch, viewer) = self.authed().await?;
        let outcome = self.hub.toggle_vote(&viewer, post_id).await?;
        let key = post_id.to_string();
        self.apply(epoch, move |state| {
            if let Some(view) = state.posts.iter_mut().find(|p| p.post.id == key) {
                view.vote_count = outcome.count;
                view.user_has_voted = outcome.active;
            }
        })
        .await;
        Ok(outcome)
    }

    pub async fn toggle_bookmark(&self, post_id: &str) -> AppResult<ToggleOutcome> {
        let (epoch, viewer) = self.authed().await?;
        let outcome = self.hub.toggle_bookmark(&viewer, post_id).await?;
        let key = post_id.to_string();
        // The returned count tallies bookmarks, not votes, so only the flag
        // is carried over to the cached view.
        self.apply(epoch, move |state| {
            if let Some(view) = state.posts.iter_mut().find(|p| p.post.id == key) {
                view.user_has_bookmarked = outcome.active;
            }
        })
        .await;
        Ok(outcome)
    }

    pub async fn toggle_follow(&self, user_id: &str) -> AppResult<ToggleOutcome> {
        let (_, viewer) = self.authed().await?;
        self.hub.toggle_follow(&viewer, user_id).await
    }

    // ---- notifications ---------------------------------------------------

    pub async fn notifications(&self) -> AppResult<Vec<Notification>> {
        let (_, viewer) = self.authed().await?;
        self.hub.notifications_for(&viewer).await
    }

    pub async fn unread_count(&self) -> AppResult<u64> {
        let (_, viewer) = self.authed().await?;
        self.hub.unread_count(&viewer).await
    }

    pub async fn mark_read(&self, id: &str) -> AppResult<Notification> {
        let (_, viewer) = self.authed().await?;
        self.hub.mark_read(&viewer, id).await
    }

    pub async fn mark_all_read(&self) -> AppResult<u64> {
        let (_, viewer) = self.authed().await?;
        self.hub.mark_all_read(&viewer).await
    }

    // ---- internals -------------------------------------------------------

    /// Installs a fresh identity. The epoch bump invalidates any transform
    /// still in flight for whoever was signed in before.
    async fn begin_identity(&self, token: String, profile: Profile) {
        let mut state = self.state.lock().await;
        state.epoch += 1;
        state.token = Some(token);
        state.viewer = Some(profile);
        state.threads.clear();
    }

    /// Captures the epoch and viewer a mutation will run under, refusing
    /// early when nobody is signed in.
    async fn authed(&self) -> AppResult<(u64, Profile)> {
        let state = self.state.lock().await;
        let viewer = state
            .viewer
            .clone()
            .ok_or_else(|| AppError::NotAuthenticated("please sign in".to_string()))?;
        Ok((state.epoch, viewer))
    }

    /// Runs a transform against the cached state, but only when the epoch
    /// still matches the one captured before the awaited call. A stale
    /// transform is dropped on the floor.
    async fn apply(&self, epoch: u64, transform: impl FnOnce(&mut SessionState)) {
        let mut state = self.state.lock().await;
        if state.epoch == epoch {
            transform(&mut state);
        }
    }
}
