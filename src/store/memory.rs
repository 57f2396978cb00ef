// In-memory backend: mutex-guarded tables with optional artificial latency
// so client-side timing behavior can be exercised without a real database.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::store::filter::{self, Filter, Order};
use crate::store::{rule_conflict, rule_filter, stamp_new_record, RecordStore, UniqueRule};

pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    rules: Vec<UniqueRule>,
    latency_ms: u64,
}

impl MemoryStore {
    pub fn new(rules: Vec<UniqueRule>) -> Self {
        MemoryStore {
            tables: Mutex::new(HashMap::new()),
            rules,
            latency_ms: 0,
        }
    }

    /// Every call sleeps for roughly this long (plus or minus a quarter) to
    /// mimic a remote round trip.
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    async fn pause(&self) {
        if self.latency_ms == 0 {
            return;
        }
        let delay = {
            let mut rng = rand::rng();
            rng.random_range(self.latency_ms * 3 / 4..=self.latency_ms * 5 / 4)
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    fn check_rules(
        &self,
        collection: &str,
        candidate: &Value,
        table: &[Value],
        exclude_id: Option<&str>,
    ) -> AppResult<()> {
        for rule in self.rules.iter().filter(|r| r.collection == collection) {
            let pair = rule_filter(rule, candidate);
            let taken = table.iter().any(|existing| {
                let same = exclude_id
                    .map(|id| existing.get("id").and_then(Value::as_str) == Some(id))
                    .unwrap_or(false);
                !same && filter::matches(existing, &pair)
            });
            if taken {
                return Err(rule_conflict(rule));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, collection: &str, mut document: Value) -> AppResult<Value> {
        self.pause().await;
        stamp_new_record(&mut document)?;
        let mut tables = self.tables.lock().await;
        let table = tables.entry(collection.to_string()).or_default();
        self.check_rules(collection, &document, table, None)?;
        table.push(document.clone());
        Ok(document)
    }

    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Value>> {
        self.pause().await;
        let tables = self.tables.lock().await;
        let found = tables.get(collection).and_then(|table| {
            table
                .iter()
                .find(|doc| doc.get("id").and_then(Value::as_str) == Some(id))
                .cloned()
        });
        Ok(found)
    }

    async fn select(
        &self,
        collection: &str,
        filter: &Filter,
        order: &Order,
    ) -> AppResult<Vec<Value>> {
        self.pause().await;
        let mut matching: Vec<Value> = {
            let tables = self.tables.lock().await;
            tables
                .get(collection)
                .map(|table| {
                    table
                        .iter()
                        .filter(|doc| filter::matches(doc, filter))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        filter::sort(&mut matching, order);
        Ok(matching)
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> AppResult<Value> {
        self.pause().await;
        let mut tables = self.tables.lock().await;
        let table = tables
            .get_mut(collection)
            .ok_or_else(|| AppError::NotFound(format!("{} record {}", collection, id)))?;
        let position = table
            .iter()
            .position(|doc| doc.get("id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| AppError::NotFound(format!("{} record {}", collection, id)))?;

        let mut patched = table[position].clone();
        filter::merge_shallow(&mut patched, &patch);
        self.check_rules(collection, &patched, table, Some(id))?;
        table[position] = patched.clone();
        Ok(patched)
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool> {
        self.pause().await;
        let mut tables = self.tables.lock().await;
        let Some(table) = tables.get_mut(collection) else {
            return Ok(false);
        };
        let before = table.len();
        table.retain(|doc| doc.get("id").and_then(Value::as_str) != Some(id));
        Ok(table.len() < before)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> AppResult<u64> {
        self.pause().await;
        let tables = self.tables.lock().await;
        let count = tables
            .get(collection)
            .map(|table| table.iter().filter(|doc| filter::matches(doc, filter)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::standard_rules;
    use serde_json::json;

    #[tokio::test]
    async fn insert_stamps_id_and_created_at() {
        let store = MemoryStore::new(vec![]);
        let doc = store
            .insert("repair_posts", json!({"item_name": "Toaster"}))
            .await
            .unwrap();
        assert!(doc["id"].is_string());
        assert!(doc["created_at"].is_string());
        assert_eq!(doc["item_name"], "Toaster");
    }

    #[tokio::test]
    async fn unique_rule_rejects_duplicate_pair() {
        let store = MemoryStore::new(standard_rules());
        store
            .insert("votes", json!({"user_id": "u1", "repair_post_id": "p1"}))
            .await
            .unwrap();
        let err = store
            .insert("votes", json!({"user_id": "u1", "repair_post_id": "p1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        // A different pair is fine
        store
            .insert("votes", json!({"user_id": "u2", "repair_post_id": "p1"}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_merges_and_protects_identity_fields() {
        let store = MemoryStore::new(vec![]);
        let doc = store
            .insert("profiles", json!({"username": "alice", "bio": "old"}))
            .await
            .unwrap();
        let id = doc["id"].as_str().unwrap();
        let updated = store
            .update("profiles", id, json!({"bio": "new", "id": "forged"}))
            .await
            .unwrap();
        assert_eq!(updated["id"], doc["id"]);
        assert_eq!(updated["bio"], "new");
        assert_eq!(updated["username"], "alice");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new(vec![]);
        let doc = store.insert("guides", json!({"item_name": "Kettle"})).await.unwrap();
        let id = doc["id"].as_str().unwrap();
        assert!(store.delete("guides", id).await.unwrap());
        assert!(!store.delete("guides", id).await.unwrap());
    }
}
