use serde_json::json;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::hub::{ensure_not_banned, ensure_owner, ensure_owner_or_admin, non_empty, Hub};
use crate::models::{
    collections, decode, decode_all, Comment, CommentDeletion, NotificationKind, Profile,
    RepairPost,
};
use crate::store::{Filter, Order};
use crate::thread::{self, CommentNode};

impl Hub {
    /// Flat, oldest-first comment list for one post.
    pub async fn comments_for_post(&self, post_id: &str) -> AppResult<Vec<Comment>> {
        self.ensure_exists(collections::REPAIR_POSTS, post_id).await?;
        let records = self
            .store
            .select(
                collections::COMMENTS,
                &Filter::new().eq("repair_post_id", post_id),
                &Order::asc("created_at"),
            )
            .await?;
        decode_all(records)
    }

    /// The reply forest for one post.
    pub async fn thread_for_post(&self, post_id: &str) -> AppResult<Vec<CommentNode>> {
        let comments = self.comments_for_post(post_id).await?;
        Ok(thread::build(&comments))
    }

    pub async fn add_comment(
        &self,
        viewer: &Profile,
        post_id: &str,
        content: &str,
        parent_id: Option<&str>,
    ) -> AppResult<Comment> {
        ensure_not_banned(viewer)?;
        let content = non_empty(content, "comment content")?;
        let post: RepairPost = decode(self.ensure_exists(collections::REPAIR_POSTS, post_id).await?)?;

        let parent: Option<Comment> = match parent_id {
            Some(parent_id) => {
                let record = self.ensure_exists(collections::COMMENTS, parent_id).await?;
                let parent: Comment = decode(record)?;
                if parent.repair_post_id != post_id {
                    return Err(AppError::Validation(
                        "parent comment belongs to a different post".to_string(),
                    ));
                }
                Some(parent)
            }
            None => None,
        };

        let document = json!({
            "user_id": viewer.id,
            "repair_post_id": post_id,
            "content": content,
            "parent_id": parent_id,
            "date": chrono::Utc::now().to_rfc3339(),
        });
        let record = self.store.insert(collections::COMMENTS, document).await?;
        let comment: Comment = decode(record)?;
        info!(comment_id = %comment.id, post_id = %post_id, "added comment");

        // Reply pings the parent author, a top-level comment pings the post
        // owner. Either way the primary write already succeeded.
        match &parent {
            Some(parent) => {
                self.notify(
                    &parent.user_id,
                    &viewer.id,
                    NotificationKind::Reply,
                    Some(post_id),
                    Some(&comment.id),
                )
                .await;
            }
            None => {
                self.notify(
                    &post.user_id,
                    &viewer.id,
                    NotificationKind::Comment,
                    Some(post_id),
                    Some(&comment.id),
                )
                .await;
            }
        }
        self.award_badges(&viewer.id).await;

        Ok(comment)
    }

    pub async fn update_comment(
        &self,
        viewer: &Profile,
        id: &str,
        content: &str,
    ) -> AppResult<Comment> {
        let record = self.ensure_exists(collections::COMMENTS, id).await?;
        let comment: Comment = decode(record)?;
        ensure_owner(viewer, &comment.user_id, "comment")?;
        let content = non_empty(content, "comment content")?;

        let updated = self
            .store
            .update(collections::COMMENTS, id, json!({ "content": content }))
            .await?;
        decode(updated)
    }

    /// Deletes a comment and every descendant whose parent chain reaches it,
    /// and reports the removed ids so a client cache can apply the same cut.
    pub async fn delete_comment(&self, viewer: &Profile, id: &str) -> AppResult<CommentDeletion> {
        let record = self.ensure_exists(collections::COMMENTS, id).await?;
        let comment: Comment = decode(record)?;
        ensure_owner_or_admin(viewer, &comment.user_id, "comment")?;

        let siblings: Vec<Comment> = decode_all(
            self.store
                .select(
                    collections::COMMENTS,
                    &Filter::new().eq("repair_post_id", comment.repair_post_id.as_str()),
                    &Order::asc("created_at"),
                )
                .await?,
        )?;
        let mut deleted_ids: Vec<String> =
            thread::cascade_set(&siblings, id).into_iter().collect();
        deleted_ids.sort();
        for doomed in &deleted_ids {
            self.store.delete(collections::COMMENTS, doomed).await?;
        }
        info!(
            comment_id = %id,
            removed = deleted_ids.len(),
            "deleted comment chain"
        );
        Ok(CommentDeletion {
            repair_post_id: comment.repair_post_id,
            deleted_ids,
        })
    }
}
