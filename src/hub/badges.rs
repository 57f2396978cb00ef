use serde_json::json;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::hub::Hub;
use crate::models::{collections, decode, decode_all, Badge, UserBadge};
use crate::store::{Filter, Order};

// Catalog and thresholds. Awards are additive; a badge once earned is never
// clawed back when posts are later deleted.
const CATALOG: &[(&str, &str, &str, &str)] = &[
    ("first-repair", "First Repair", "Shared your first repair", "🔧"),
    ("contributor", "Contributor", "Shared five repairs", "🛠️"),
    ("helpful", "Helpful", "Left ten comments for other fixers", "💬"),
];

const CONTRIBUTOR_POSTS: u64 = 5;
const HELPFUL_COMMENTS: u64 = 10;

impl Hub {
    /// Idempotent: the slug uniqueness rule turns a re-seed into no-ops.
    pub(crate) async fn seed_badge_catalog(&self) -> AppResult<()> {
        for (slug, name, description, icon) in CATALOG {
            let document = json!({
                "slug": slug,
                "name": name,
                "description": description,
                "icon": icon,
            });
            match self.store.insert(collections::BADGES, document).await {
                Ok(_) | Err(AppError::Conflict(_)) => {}
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    /// Re-evaluates thresholds after a post or comment lands. Best effort:
    /// a failed award is logged and forgotten, the triggering write stays.
    pub(crate) async fn award_badges(&self, user_id: &str) {
        if let Err(err) = self.try_award_badges(user_id).await {
            warn!(user_id, "badge award failed: {}", err);
        }
    }

    async fn try_award_badges(&self, user_id: &str) -> AppResult<()> {
        let posts = self
            .store
            .count(
                collections::REPAIR_POSTS,
                &Filter::new().eq("user_id", user_id),
            )
            .await?;
        let comments = self
            .store
            .count(collections::COMMENTS, &Filter::new().eq("user_id", user_id))
            .await?;

        let mut earned: Vec<&str> = Vec::new();
        if posts >= 1 {
            earned.push("first-repair");
        }
        if posts >= CONTRIBUTOR_POSTS {
            earned.push("contributor");
        }
        if comments >= HELPFUL_COMMENTS {
            earned.push("helpful");
        }

        for slug in earned {
            let Some(badge) = self.badge_by_slug(slug).await? else {
                warn!(slug, "badge missing from catalog");
                continue;
            };
            let grant = json!({ "user_id": user_id, "badge_id": badge.id });
            match self.store.insert(collections::USER_BADGES, grant).await {
                Ok(_) | Err(AppError::Conflict(_)) => {}
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    async fn badge_by_slug(&self, slug: &str) -> AppResult<Option<Badge>> {
        let records = self
            .store
            .select(
                collections::BADGES,
                &Filter::new().eq("slug", slug),
                &Order::asc("created_at"),
            )
            .await?;
        match records.into_iter().next() {
            Some(record) => Ok(Some(decode(record)?)),
            None => Ok(None),
        }
    }

    /// Earned badges in the order they were granted.
    pub async fn badges_for(&self, user_id: &str) -> AppResult<Vec<Badge>> {
        let grants: Vec<UserBadge> = decode_all(
            self.store
                .select(
                    collections::USER_BADGES,
                    &Filter::new().eq("user_id", user_id),
                    &Order::asc("created_at"),
                )
                .await?,
        )?;
        let mut badges = Vec::with_capacity(grants.len());
        for grant in grants {
            if let Some(record) = self.store.get(collections::BADGES, &grant.badge_id).await? {
                badges.push(decode(record)?);
            }
        }
        Ok(badges)
    }
}
