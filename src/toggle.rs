// Membership toggles over relation collections: vote, bookmark, follow.
// One controller instance per relation, all sharing the same read-then-act
// shape: look the pair up, delete it if present, insert it if not, then
// recount from the store. No local increments, no automatic retries.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;

use crate::cache::Cache;
use crate::error::{AppError, AppResult};
use crate::models::ToggleOutcome;
use crate::store::{record_id, Filter, Order, RecordStore};

#[derive(Debug, Clone, Copy)]
pub struct ToggleSpec {
    pub collection: &'static str,
    pub actor_field: &'static str,
    pub target_field: &'static str,
}

pub const VOTES: ToggleSpec = ToggleSpec {
    collection: "votes",
    actor_field: "user_id",
    target_field: "repair_post_id",
};

pub const BOOKMARKS: ToggleSpec = ToggleSpec {
    collection: "bookmarks",
    actor_field: "user_id",
    target_field: "repair_post_id",
};

pub const FOLLOWS: ToggleSpec = ToggleSpec {
    collection: "follows",
    actor_field: "follower_id",
    target_field: "followed_id",
};

const PAIR_LOCKS: usize = 1024;

pub struct ToggleController {
    store: Arc<dyn RecordStore>,
    spec: ToggleSpec,
    pair_locks: Mutex<Cache<(String, String), Arc<Mutex<()>>>>,
}

impl ToggleController {
    pub fn new(store: Arc<dyn RecordStore>, spec: ToggleSpec) -> Self {
        ToggleController {
            store,
            spec,
            pair_locks: Mutex::new(Cache::new(PAIR_LOCKS)),
        }
    }

    // Lock eviction under heavy load only widens the race the store's
    // uniqueness rule already backstops.
    async fn pair_lock(&self, actor: &str, target: &str) -> Arc<Mutex<()>> {
        let key = (actor.to_string(), target.to_string());
        let mut locks = self.pair_locks.lock().await;
        if let Some(lock) = locks.get(&key) {
            return lock.clone();
        }
        let lock = Arc::new(Mutex::new(()));
        locks.insert(key, lock.clone());
        lock
    }

    fn pair_filter(&self, actor: &str, target: &str) -> Filter {
        Filter::new()
            .eq(self.spec.actor_field, actor)
            .eq(self.spec.target_field, target)
    }

    /// Flips the relation for (actor, target) and reports the new state with
    /// a fresh count. Calls for the same pair are serialized, so a rapid
    /// double submit becomes two full toggles instead of a race. If the
    /// store rejects the flip, nothing was changed and the error comes back
    /// as-is.
    pub async fn toggle(&self, actor: &str, target: &str) -> AppResult<ToggleOutcome> {
        let lock = self.pair_lock(actor, target).await;
        let _serialized = lock.lock().await;

        let existing = self
            .store
            .select(
                self.spec.collection,
                &self.pair_filter(actor, target),
                &Order::asc("created_at"),
            )
            .await?;

        let active = match existing.first() {
            Some(relation) => {
                self.store
                    .delete(self.spec.collection, &record_id(relation)?)
                    .await?;
                false
            }
            None => {
                let document = json!({
                    self.spec.actor_field: actor,
                    self.spec.target_field: target,
                });
                match self.store.insert(self.spec.collection, document).await {
                    Ok(_) => {}
                    // A concurrent writer got there first; the relation is
                    // already in the state this half of the toggle wanted.
                    Err(AppError::Conflict(_)) => {}
                    Err(other) => return Err(other),
                }
                true
            }
        };

        let count = self.count_for(target).await?;
        Ok(ToggleOutcome { active, count })
    }

    pub async fn is_active(&self, actor: &str, target: &str) -> AppResult<bool> {
        let found = self
            .store
            .count(self.spec.collection, &self.pair_filter(actor, target))
            .await?;
        Ok(found > 0)
    }

    /// Fresh count straight from the store; displayed totals always come
    /// from here, never from bumping a cached number.
    pub async fn count_for(&self, target: &str) -> AppResult<i64> {
        let count = self
            .store
            .count(
                self.spec.collection,
                &Filter::new().eq(self.spec.target_field, target),
            )
            .await?;
        Ok(count as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{standard_rules, MemoryStore};

    fn controller() -> ToggleController {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new(standard_rules()));
        ToggleController::new(store, VOTES)
    }

    #[tokio::test]
    async fn toggles_alternate_strictly() {
        let votes = controller();
        for round in 0..6 {
            let outcome = votes.toggle("u1", "p1").await.unwrap();
            let expect_active = round % 2 == 0;
            assert_eq!(outcome.active, expect_active);
            assert_eq!(outcome.count, if expect_active { 1 } else { 0 });
        }
    }

    #[tokio::test]
    async fn count_reflects_other_actors() {
        let votes = controller();
        votes.toggle("u1", "p1").await.unwrap();
        votes.toggle("u2", "p1").await.unwrap();
        let outcome = votes.toggle("u3", "p1").await.unwrap();
        assert_eq!(outcome.count, 3);

        // One actor backs out; recount sees the others
        let outcome = votes.toggle("u2", "p1").await.unwrap();
        assert!(!outcome.active);
        assert_eq!(outcome.count, 2);
        assert!(votes.is_active("u1", "p1").await.unwrap());
        assert!(!votes.is_active("u2", "p1").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_double_submit_serializes() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new(standard_rules()));
        let votes = Arc::new(ToggleController::new(store, VOTES));

        let a = tokio::spawn({
            let votes = votes.clone();
            async move { votes.toggle("u1", "p1").await }
        });
        let b = tokio::spawn({
            let votes = votes.clone();
            async move { votes.toggle("u1", "p1").await }
        });
        let first = a.await.unwrap().unwrap();
        let second = b.await.unwrap().unwrap();

        // Two full toggles ran back to back: one on, one off
        assert_ne!(first.active, second.active);
        assert_eq!(votes.count_for("p1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pairs_do_not_interfere() {
        let votes = controller();
        votes.toggle("u1", "p1").await.unwrap();
        votes.toggle("u1", "p2").await.unwrap();
        assert_eq!(votes.count_for("p1").await.unwrap(), 1);
        assert_eq!(votes.count_for("p2").await.unwrap(), 1);
    }
}
