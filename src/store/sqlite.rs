// SQLite backend: one generic records table holding JSON documents, with
// uniqueness rules compiled into partial expression indexes so the engine
// itself rejects duplicate pairs, and a small LRU in front of point reads.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::Row;
use tokio::sync::Mutex;

use crate::cache::Cache;
use crate::error::{AppError, AppResult};
use crate::store::filter::{self, Filter, Order};
use crate::store::{stamp_new_record, RecordStore, UniqueRule};

pub struct SqliteStore {
    pool: SqlitePool,
    record_cache: Arc<Mutex<Cache<String, Value>>>,
}

impl SqliteStore {
    /// `url` is a `sqlite:` connection string; the file is created when
    /// missing so fresh deployments and test directories work unprepared.
    pub async fn open(
        url: &str,
        rules: Vec<UniqueRule>,
        cache_capacity: usize,
    ) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::Store(format!("bad sqlite url: {}", e)))?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        let store = SqliteStore {
            pool,
            record_cache: Arc::new(Mutex::new(Cache::new(cache_capacity))),
        };
        store.init(&rules).await?;
        Ok(store)
    }

    async fn init(&self, rules: &[UniqueRule]) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_records_collection_created
             ON records(collection, created_at)",
        )
        .execute(&self.pool)
        .await?;

        for rule in rules {
            let sql = unique_index_sql(rule);
            sqlx::query(&sql).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn cache_key(collection: &str, id: &str) -> String {
        format!("{}:{}", collection, id)
    }

    async fn load_collection(&self, collection: &str) -> AppResult<Vec<Value>> {
        let rows = sqlx::query("SELECT data FROM records WHERE collection = ?")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;
        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.get("data");
            documents.push(serde_json::from_str(&raw)?);
        }
        Ok(documents)
    }
}

// Uniqueness as a partial expression index, e.g. votes unique per
// (user_id, repair_post_id). Field names come from compiled-in rule tables,
// never from request input.
fn unique_index_sql(rule: &UniqueRule) -> String {
    let columns = rule
        .fields
        .iter()
        .map(|field| format!("json_extract(data, '$.{}')", field))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS uniq_{}_{} ON records({}) WHERE collection = '{}'",
        rule.collection,
        rule.fields.join("_"),
        columns,
        rule.collection
    )
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert(&self, collection: &str, mut document: Value) -> AppResult<Value> {
        stamp_new_record(&mut document)?;
        let id = document["id"].as_str().unwrap_or_default().to_string();
        let created_at = document["created_at"].as_str().unwrap_or_default().to_string();
        let data = serde_json::to_string(&document)?;

        sqlx::query("INSERT INTO records (collection, id, data, created_at) VALUES (?, ?, ?, ?)")
            .bind(collection)
            .bind(&id)
            .bind(&data)
            .bind(&created_at)
            .execute(&self.pool)
            .await?;

        self.record_cache
            .lock()
            .await
            .insert(Self::cache_key(collection, &id), document.clone());
        Ok(document)
    }

    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Value>> {
        {
            let mut cache = self.record_cache.lock().await;
            if let Some(document) = cache.get(&Self::cache_key(collection, id)).cloned() {
                return Ok(Some(document));
            }
        }

        let row = sqlx::query("SELECT data FROM records WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("data");
                let document: Value = serde_json::from_str(&raw)?;
                self.record_cache
                    .lock()
                    .await
                    .insert(Self::cache_key(collection, id), document.clone());
                Ok(Some(document))
            }
            None => Ok(None),
        }
    }

    async fn select(
        &self,
        collection: &str,
        filter: &Filter,
        order: &Order,
    ) -> AppResult<Vec<Value>> {
        let mut documents = self.load_collection(collection).await?;
        documents.retain(|doc| filter::matches(doc, filter));
        filter::sort(&mut documents, order);
        Ok(documents)
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> AppResult<Value> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT data FROM records WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let raw: String = match row {
            Some(row) => row.get("data"),
            None => {
                return Err(AppError::NotFound(format!("{} record {}", collection, id)));
            }
        };
        let mut document: Value = serde_json::from_str(&raw)?;
        filter::merge_shallow(&mut document, &patch);
        let data = serde_json::to_string(&document)?;

        sqlx::query("UPDATE records SET data = ? WHERE collection = ? AND id = ?")
            .bind(&data)
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        // Invalidate only after a successful commit
        self.record_cache
            .lock()
            .await
            .remove(&Self::cache_key(collection, id));
        Ok(document)
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.record_cache
            .lock()
            .await
            .remove(&Self::cache_key(collection, id));
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> AppResult<u64> {
        if filter.is_empty() {
            let row = sqlx::query("SELECT COUNT(*) FROM records WHERE collection = ?")
                .bind(collection)
                .fetch_one(&self.pool)
                .await?;
            let count: i64 = row.get(0);
            return Ok(count as u64);
        }
        let documents = self.load_collection(collection).await?;
        Ok(documents
            .iter()
            .filter(|doc| filter::matches(doc, filter))
            .count() as u64)
    }
}
