// Timeout decorator: wraps another store and bounds every call, auth and
// storage included, so a hung backend surfaces as a Timeout error instead of
// stalling the caller forever. Nothing here retries; that stays a caller
// decision.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::error;

use crate::error::{AppError, AppResult};
use crate::store::filter::{Filter, Order};
use crate::store::{AuthSession, RecordStore};

pub struct TimedStore {
    inner: Arc<dyn RecordStore>,
    deadline: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn RecordStore>, deadline: Duration) -> Self {
        TimedStore { inner, deadline }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl std::future::Future<Output = AppResult<T>> + Send,
    ) -> AppResult<T> {
        match tokio::time::timeout(self.deadline, call).await {
            Ok(result) => result,
            Err(_) => {
                error!(operation, deadline_ms = self.deadline.as_millis() as u64, "store call timed out");
                Err(AppError::Timeout(format!(
                    "{} exceeded {}ms",
                    operation,
                    self.deadline.as_millis()
                )))
            }
        }
    }
}

#[async_trait]
impl RecordStore for TimedStore {
    async fn insert(&self, collection: &str, document: Value) -> AppResult<Value> {
        self.bounded("insert", self.inner.insert(collection, document)).await
    }

    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Value>> {
        self.bounded("get", self.inner.get(collection, id)).await
    }

    async fn select(
        &self,
        collection: &str,
        filter: &Filter,
        order: &Order,
    ) -> AppResult<Vec<Value>> {
        self.bounded("select", self.inner.select(collection, filter, order)).await
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> AppResult<Value> {
        self.bounded("update", self.inner.update(collection, id, patch)).await
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool> {
        self.bounded("delete", self.inner.delete(collection, id)).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> AppResult<u64> {
        self.bounded("count", self.inner.count(collection, filter)).await
    }

    async fn sign_up(&self, email: &str, username: &str, password: &str) -> AppResult<AuthSession> {
        self.bounded("sign_up", self.inner.sign_up(email, username, password)).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        self.bounded("sign_in", self.inner.sign_in(email, password)).await
    }

    async fn sign_out(&self, token: &str) -> AppResult<()> {
        self.bounded("sign_out", self.inner.sign_out(token)).await
    }

    async fn current_identity(&self, token: &str) -> AppResult<Option<Value>> {
        self.bounded("current_identity", self.inner.current_identity(token)).await
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> AppResult<String> {
        self.bounded("upload", self.inner.upload(bucket, path, bytes)).await
    }

    async fn fetch_object(&self, bucket: &str, path: &str) -> AppResult<Option<Vec<u8>>> {
        self.bounded("fetch_object", self.inner.fetch_object(bucket, path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn passes_fast_calls_through() {
        let inner = Arc::new(MemoryStore::new(vec![]));
        let store = TimedStore::new(inner, Duration::from_secs(5));
        let doc = store.insert("guides", json!({"item_name": "Lamp"})).await.unwrap();
        assert!(store.get("guides", doc["id"].as_str().unwrap()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn maps_elapsed_deadline_to_timeout() {
        // 300ms simulated latency against a 10ms deadline
        let inner = Arc::new(MemoryStore::new(vec![]).with_latency(300));
        let store = TimedStore::new(inner, Duration::from_millis(10));
        let err = store.insert("guides", json!({"item_name": "Lamp"})).await.unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }
}
