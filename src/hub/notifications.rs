use serde_json::json;
use tracing::warn;

use crate::error::AppResult;
use crate::hub::Hub;
use crate::models::{collections, decode, decode_all, Notification, NotificationKind, Profile};
use crate::store::{record_id, Filter, Order};

impl Hub {
    /// Fan-out write after a primary action. Self-notifications are skipped
    /// and failures are logged and swallowed: the vote or comment that
    /// triggered this already succeeded, and a lost ping must not undo it.
    pub(crate) async fn notify(
        &self,
        recipient: &str,
        actor: &str,
        kind: NotificationKind,
        repair_post_id: Option<&str>,
        comment_id: Option<&str>,
    ) {
        if recipient == actor {
            return;
        }
        let document = json!({
            "user_id": recipient,
            "actor_id": actor,
            "kind": kind,
            "repair_post_id": repair_post_id,
            "comment_id": comment_id,
            "is_read": false,
        });
        if let Err(err) = self.store.insert(collections::NOTIFICATIONS, document).await {
            warn!(recipient, ?kind, "notification write failed: {}", err);
        }
    }

    pub async fn notifications_for(&self, viewer: &Profile) -> AppResult<Vec<Notification>> {
        let records = self
            .store
            .select(
                collections::NOTIFICATIONS,
                &Filter::new().eq("user_id", viewer.id.as_str()),
                &Order::desc("created_at"),
            )
            .await?;
        decode_all(records)
    }

    pub async fn unread_count(&self, viewer: &Profile) -> AppResult<u64> {
        self.store
            .count(
                collections::NOTIFICATIONS,
                &Filter::new()
                    .eq("user_id", viewer.id.as_str())
                    .eq("is_read", false),
            )
            .await
    }

    pub async fn mark_read(&self, viewer: &Profile, id: &str) -> AppResult<Notification> {
        let notification: Notification =
            decode(self.ensure_exists(collections::NOTIFICATIONS, id).await?)?;
        if notification.user_id != viewer.id {
            return Err(crate::error::AppError::Forbidden(
                "not your notification".to_string(),
            ));
        }
        let updated = self
            .store
            .update(collections::NOTIFICATIONS, id, json!({ "is_read": true }))
            .await?;
        decode(updated)
    }

    /// Marks everything unread as read; returns how many were flipped.
    pub async fn mark_all_read(&self, viewer: &Profile) -> AppResult<u64> {
        let unread = self
            .store
            .select(
                collections::NOTIFICATIONS,
                &Filter::new()
                    .eq("user_id", viewer.id.as_str())
                    .eq("is_read", false),
                &Order::asc("created_at"),
            )
            .await?;
        let mut flipped = 0;
        for record in &unread {
            self.store
                .update(
                    collections::NOTIFICATIONS,
                    &record_id(record)?,
                    json!({ "is_read": true }),
                )
                .await?;
            flipped += 1;
        }
        Ok(flipped)
    }
}
