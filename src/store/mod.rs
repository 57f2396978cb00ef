// Record store contract: generic JSON-document collections, identity, and
// object storage behind one trait so backends stay interchangeable.

pub mod filter;
pub mod memory;
pub mod sqlite;
pub mod timed;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde_json::{json, Value};

use crate::config::StoreConfig;
use crate::error::{AppError, AppResult};

pub use filter::{Filter, Order};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use timed::TimedStore;

// Store-private collections backing the auth and storage contracts. They
// never cross the application boundary.
const CREDENTIALS: &str = "credentials";
const SESSIONS: &str = "sessions";
const STORAGE_OBJECTS: &str = "storage_objects";

/// Insert-time uniqueness constraint over one or more document fields.
#[derive(Debug, Clone)]
pub struct UniqueRule {
    pub collection: &'static str,
    pub fields: &'static [&'static str],
}

impl UniqueRule {
    pub const fn new(collection: &'static str, fields: &'static [&'static str]) -> Self {
        UniqueRule { collection, fields }
    }
}

/// The rules every backend enforces. Relation collections are unique per
/// (actor, target) pair so a toggle can never double-insert.
pub fn standard_rules() -> Vec<UniqueRule> {
    vec![
        UniqueRule::new("profiles", &["username"]),
        UniqueRule::new("profiles", &["email"]),
        UniqueRule::new("categories", &["name"]),
        UniqueRule::new("votes", &["user_id", "repair_post_id"]),
        UniqueRule::new("bookmarks", &["user_id", "repair_post_id"]),
        UniqueRule::new("follows", &["follower_id", "followed_id"]),
        UniqueRule::new("badges", &["slug"]),
        UniqueRule::new("user_badges", &["user_id", "badge_id"]),
        UniqueRule::new(CREDENTIALS, &["email"]),
        UniqueRule::new(SESSIONS, &["token"]),
        UniqueRule::new(STORAGE_OBJECTS, &["bucket", "path"]),
    ]
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    /// The signed-in profile document.
    pub user: Value,
}

/// Unified persistence contract. Collection operations work on JSON
/// documents; the store owns `id` and `created_at` injection. Identity and
/// object storage have default implementations in terms of the collection
/// operations, so a backend only has to supply the six generic calls.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts a document, assigning `id` and `created_at`. Violating a
    /// registered uniqueness rule yields `Conflict`.
    async fn insert(&self, collection: &str, document: Value) -> AppResult<Value>;

    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Value>>;

    /// Returns every matching document in a total order: the requested field
    /// first, ties broken by `id` ascending.
    async fn select(&self, collection: &str, filter: &Filter, order: &Order)
        -> AppResult<Vec<Value>>;

    /// Shallow field merge. `id` and `created_at` are immutable.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> AppResult<Value>;

    /// Idempotent; returns false when the id was already absent.
    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool>;

    async fn count(&self, collection: &str, filter: &Filter) -> AppResult<u64>;

    async fn sign_up(&self, email: &str, username: &str, password: &str) -> AppResult<AuthSession> {
        validate_email(email)?;
        validate_username(username)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let user = self
            .insert(
                "profiles",
                json!({
                    "username": username,
                    "email": email,
                    "is_admin": false,
                    "is_banned": false,
                }),
            )
            .await?;
        let user_id = record_id(&user)?;
        self.insert(
            CREDENTIALS,
            json!({ "email": email, "user_id": user_id, "password_hash": password_hash }),
        )
        .await?;

        let token = new_token();
        self.insert(SESSIONS, json!({ "token": token, "user_id": user_id }))
            .await?;
        Ok(AuthSession { token, user })
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        let creds = self
            .select(
                CREDENTIALS,
                &Filter::new().eq("email", email),
                &Order::asc("created_at"),
            )
            .await?;
        // One rejection message for both unknown email and bad password.
        let denied = || AppError::NotAuthenticated("invalid email or password".to_string());
        let cred = creds.first().ok_or_else(denied)?;
        let stored = cred
            .get("password_hash")
            .and_then(Value::as_str)
            .ok_or_else(denied)?;
        if !verify_password(password, stored) {
            return Err(denied());
        }
        let user_id = cred
            .get("user_id")
            .and_then(Value::as_str)
            .ok_or_else(denied)?;
        let user = self
            .get("profiles", user_id)
            .await?
            .ok_or_else(denied)?;

        let token = new_token();
        self.insert(SESSIONS, json!({ "token": token, "user_id": user_id }))
            .await?;
        Ok(AuthSession { token, user })
    }

    async fn sign_out(&self, token: &str) -> AppResult<()> {
        let sessions = self
            .select(
                SESSIONS,
                &Filter::new().eq("token", token),
                &Order::asc("created_at"),
            )
            .await?;
        for session in sessions {
            self.delete(SESSIONS, &record_id(&session)?).await?;
        }
        Ok(())
    }

    async fn current_identity(&self, token: &str) -> AppResult<Option<Value>> {
        let sessions = self
            .select(
                SESSIONS,
                &Filter::new().eq("token", token),
                &Order::asc("created_at"),
            )
            .await?;
        let Some(session) = sessions.first() else {
            return Ok(None);
        };
        let Some(user_id) = session.get("user_id").and_then(Value::as_str) else {
            return Ok(None);
        };
        self.get("profiles", user_id).await
    }

    /// Stores bytes under (bucket, path), replacing any previous object, and
    /// returns the public URL they will be served from.
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> AppResult<String> {
        validate_object_path(bucket, path)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let existing = self
            .select(
                STORAGE_OBJECTS,
                &Filter::new().eq("bucket", bucket).eq("path", path),
                &Order::asc("created_at"),
            )
            .await?;
        match existing.first() {
            Some(object) => {
                self.update(STORAGE_OBJECTS, &record_id(object)?, json!({ "data": encoded }))
                    .await?;
            }
            None => {
                self.insert(
                    STORAGE_OBJECTS,
                    json!({ "bucket": bucket, "path": path, "data": encoded }),
                )
                .await?;
            }
        }
        Ok(format!("/storage/{}/{}", bucket, path))
    }

    async fn fetch_object(&self, bucket: &str, path: &str) -> AppResult<Option<Vec<u8>>> {
        let objects = self
            .select(
                STORAGE_OBJECTS,
                &Filter::new().eq("bucket", bucket).eq("path", path),
                &Order::asc("created_at"),
            )
            .await?;
        let Some(object) = objects.first() else {
            return Ok(None);
        };
        let encoded = object
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Internal("stored object has no data field".to_string()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| AppError::Internal(format!("stored object is not base64: {}", e)))?;
        Ok(Some(bytes))
    }
}

// `Result<Arc<dyn RecordStore>, _>::unwrap_err` needs the Ok side to be Debug.
impl std::fmt::Debug for dyn RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn RecordStore")
    }
}

/// Builds the configured backend and wraps it with the call-timeout guard.
pub async fn open(config: &StoreConfig, cache_capacity: usize) -> AppResult<Arc<dyn RecordStore>> {
    let rules = standard_rules();
    let inner: Arc<dyn RecordStore> = if config.url.starts_with("sqlite:") {
        Arc::new(SqliteStore::open(&config.url, rules, cache_capacity).await?)
    } else if config.url.starts_with("memory") {
        Arc::new(MemoryStore::new(rules).with_latency(config.simulated_latency_ms))
    } else {
        return Err(AppError::Validation(format!(
            "unsupported store url: {}",
            config.url
        )));
    };
    Ok(Arc::new(TimedStore::new(
        inner,
        Duration::from_secs(config.timeout_secs.max(1)),
    )))
}

pub fn record_id(document: &Value) -> AppResult<String> {
    document
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::Internal("record has no id".to_string()))
}

pub(crate) fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// Fixed-width RFC 3339 so the string ordering of two timestamps is their
// chronological ordering.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub(crate) fn stamp_new_record(document: &mut Value) -> AppResult<()> {
    let Some(fields) = document.as_object_mut() else {
        return Err(AppError::Validation(
            "document must be a JSON object".to_string(),
        ));
    };
    fields.insert("id".to_string(), Value::String(new_record_id()));
    fields.insert("created_at".to_string(), Value::String(now_timestamp()));
    Ok(())
}

pub(crate) fn rule_filter(rule: &UniqueRule, document: &Value) -> Filter {
    let mut filter = Filter::new();
    for field in rule.fields {
        let value = document.get(*field).cloned().unwrap_or(Value::Null);
        filter = filter.eq(*field, value);
    }
    filter
}

pub(crate) fn rule_conflict(rule: &UniqueRule) -> AppError {
    AppError::Conflict(format!(
        "{} already contains a record with the same {}",
        rule.collection,
        rule.fields.join("+")
    ))
}

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());
static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{3,24}$").unwrap());

fn validate_email(email: &str) -> AppResult<()> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(AppError::Validation("invalid email address".to_string()))
    }
}

fn validate_username(username: &str) -> AppResult<()> {
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err(AppError::Validation(
            "username must be 3-24 characters of letters, digits or underscore".to_string(),
        ))
    }
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.len() >= 8 {
        Ok(())
    } else {
        Err(AppError::Validation(
            "password must be at least 8 characters".to_string(),
        ))
    }
}

fn validate_object_path(bucket: &str, path: &str) -> AppResult<()> {
    if bucket.is_empty() || path.is_empty() {
        return Err(AppError::Validation("empty bucket or path".to_string()));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(AppError::Validation("path may not traverse upward".to_string()));
    }
    Ok(())
}

fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn hash_password(password: &str) -> AppResult<String> {
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
    let salt = SaltString::generate(&mut OsRng);
    argon2::Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, stored: &str) -> bool {
    use argon2::password_hash::{PasswordHash, PasswordVerifier};
    PasswordHash::new(stored)
        .map(|parsed| {
            argon2::Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}
