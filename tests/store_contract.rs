// Contract tests run against every backend so the memory and sqlite stores
// can never drift apart on filtering, ordering, merging or uniqueness.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use repairhub::config::StoreConfig;
use repairhub::error::AppError;
use repairhub::store::{
    self, standard_rules, Filter, MemoryStore, Order, RecordStore, SqliteStore, TimedStore,
};

async fn backends(dir: &TempDir) -> Vec<(&'static str, Arc<dyn RecordStore>)> {
    let url = format!("sqlite:{}", dir.path().join("contract.db").display());
    let memory: Arc<dyn RecordStore> = Arc::new(MemoryStore::new(standard_rules()));
    let sqlite: Arc<dyn RecordStore> = Arc::new(
        SqliteStore::open(&url, standard_rules(), 64)
            .await
            .expect("sqlite store should open"),
    );
    vec![("memory", memory), ("sqlite", sqlite)]
}

#[tokio::test]
async fn insert_assigns_identity_and_returns_document() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in backends(&dir).await {
        let record = store
            .insert("guides", json!({ "item_name": "Toaster", "guide_content": "Unplug first." }))
            .await
            .unwrap();

        let id = record["id"].as_str().unwrap_or_default();
        assert!(!id.is_empty(), "{name}: id must be assigned");
        assert!(
            !record["created_at"].as_str().unwrap_or_default().is_empty(),
            "{name}: created_at must be assigned"
        );
        assert_eq!(record["item_name"], "Toaster", "{name}");

        let fetched = store.get("guides", id).await.unwrap();
        assert_eq!(fetched, Some(record), "{name}: get must return the insert");
    }
}

#[tokio::test]
async fn select_orders_by_field_and_breaks_ties_by_id() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in backends(&dir).await {
        for rank in [2, 1, 3] {
            store
                .insert("guides", json!({ "item_name": "Kettle", "rank": rank }))
                .await
                .unwrap();
        }

        let ranked = store
            .select("guides", &Filter::new(), &Order::asc("rank"))
            .await
            .unwrap();
        let ranks: Vec<i64> = ranked.iter().map(|r| r["rank"].as_i64().unwrap()).collect();
        assert_eq!(ranks, vec![1, 2, 3], "{name}");

        // All documents share item_name, so ordering on it degenerates to
        // the id tie-break, which is ascending in both directions.
        let asc = store
            .select("guides", &Filter::new(), &Order::asc("item_name"))
            .await
            .unwrap();
        let desc = store
            .select("guides", &Filter::new(), &Order::desc("item_name"))
            .await
            .unwrap();
        let asc_ids: Vec<&str> = asc.iter().map(|r| r["id"].as_str().unwrap()).collect();
        let desc_ids: Vec<&str> = desc.iter().map(|r| r["id"].as_str().unwrap()).collect();
        let mut sorted = asc_ids.clone();
        sorted.sort();
        assert_eq!(asc_ids, sorted, "{name}: ties resolve by id ascending");
        assert_eq!(asc_ids, desc_ids, "{name}: tie order ignores direction");
    }
}

#[tokio::test]
async fn contains_any_searches_across_fields_case_insensitively() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in backends(&dir).await {
        store
            .insert(
                "repair_posts",
                json!({ "item_name": "iPhone 13", "issue_description": "cracked screen" }),
            )
            .await
            .unwrap();
        store
            .insert(
                "repair_posts",
                json!({ "item_name": "Kettle", "issue_description": "Heating element on an iphone dock" }),
            )
            .await
            .unwrap();
        store
            .insert(
                "repair_posts",
                json!({ "item_name": "Lamp", "issue_description": "flickers" }),
            )
            .await
            .unwrap();

        let hits = store
            .select(
                "repair_posts",
                &Filter::new().contains_any(&["item_name", "issue_description"], "IPHONE"),
                &Order::asc("created_at"),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 2, "{name}: match either field, any case");
    }
}

#[tokio::test]
async fn update_merges_fields_but_never_identity() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in backends(&dir).await {
        let record = store
            .insert("guides", json!({ "item_name": "Blender", "status": "draft" }))
            .await
            .unwrap();
        let id = record["id"].as_str().unwrap().to_string();
        let created_at = record["created_at"].clone();

        let updated = store
            .update(
                "guides",
                &id,
                json!({ "status": "published", "id": "forged", "created_at": "1970-01-01" }),
            )
            .await
            .unwrap();
        assert_eq!(updated["status"], "published", "{name}");
        assert_eq!(updated["id"].as_str(), Some(id.as_str()), "{name}: id is immutable");
        assert_eq!(updated["created_at"], created_at, "{name}: created_at is immutable");
        assert_eq!(updated["item_name"], "Blender", "{name}: untouched fields survive");

        let cleared = store
            .update("guides", &id, json!({ "status": null }))
            .await
            .unwrap();
        assert!(cleared["status"].is_null(), "{name}: null clears a field");
    }
}

#[tokio::test]
async fn delete_is_idempotent_and_count_honors_filters() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in backends(&dir).await {
        let kept = store
            .insert("notifications", json!({ "user_id": "u1", "is_read": false }))
            .await
            .unwrap();
        store
            .insert("notifications", json!({ "user_id": "u1", "is_read": true }))
            .await
            .unwrap();
        store
            .insert("notifications", json!({ "user_id": "u2", "is_read": false }))
            .await
            .unwrap();

        let unread_u1 = store
            .count(
                "notifications",
                &Filter::new().eq("user_id", "u1").eq("is_read", false),
            )
            .await
            .unwrap();
        assert_eq!(unread_u1, 1, "{name}");

        let id = kept["id"].as_str().unwrap();
        assert!(store.delete("notifications", id).await.unwrap(), "{name}");
        assert!(!store.delete("notifications", id).await.unwrap(), "{name}: second delete is a no-op");
        assert_eq!(
            store.count("notifications", &Filter::new()).await.unwrap(),
            2,
            "{name}"
        );
    }
}

#[tokio::test]
async fn pair_uniqueness_yields_conflict() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in backends(&dir).await {
        store
            .insert("votes", json!({ "user_id": "u1", "repair_post_id": "p1" }))
            .await
            .unwrap();

        let err = store
            .insert("votes", json!({ "user_id": "u1", "repair_post_id": "p1" }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)), "{name}: got {err}");

        // A different pair is still fine.
        store
            .insert("votes", json!({ "user_id": "u1", "repair_post_id": "p2" }))
            .await
            .unwrap();
        store
            .insert("votes", json!({ "user_id": "u2", "repair_post_id": "p1" }))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn auth_lifecycle_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in backends(&dir).await {
        let session = store
            .sign_up("mara@example.com", "mara", "superseekrit")
            .await
            .unwrap();
        let identity = store.current_identity(&session.token).await.unwrap();
        assert_eq!(
            identity.as_ref().and_then(|u| u["username"].as_str()),
            Some("mara"),
            "{name}"
        );

        store.sign_out(&session.token).await.unwrap();
        assert!(
            store.current_identity(&session.token).await.unwrap().is_none(),
            "{name}: revoked token resolves to nobody"
        );
        // Signing out twice is harmless.
        store.sign_out(&session.token).await.unwrap();

        let fresh = store.sign_in("mara@example.com", "superseekrit").await.unwrap();
        assert!(store.current_identity(&fresh.token).await.unwrap().is_some(), "{name}");

        let err = store
            .sign_in("mara@example.com", "wrong-password")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotAuthenticated(_)), "{name}");
        let err = store
            .sign_in("nobody@example.com", "superseekrit")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotAuthenticated(_)), "{name}");

        let err = store
            .sign_up("mara@example.com", "mara2", "superseekrit")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)), "{name}: email is taken");
    }
}

#[tokio::test]
async fn storage_round_trip_and_path_hygiene() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in backends(&dir).await {
        let url = store
            .upload("avatars", "u1/a.png", b"fake png bytes".to_vec())
            .await
            .unwrap();
        assert_eq!(url, "/storage/avatars/u1/a.png", "{name}");

        let bytes = store.fetch_object("avatars", "u1/a.png").await.unwrap();
        assert_eq!(bytes.as_deref(), Some(b"fake png bytes".as_slice()), "{name}");

        // Re-uploading the same path replaces the object.
        store
            .upload("avatars", "u1/a.png", b"newer bytes".to_vec())
            .await
            .unwrap();
        let bytes = store.fetch_object("avatars", "u1/a.png").await.unwrap();
        assert_eq!(bytes.as_deref(), Some(b"newer bytes".as_slice()), "{name}");

        assert!(
            store.fetch_object("avatars", "u9/missing.png").await.unwrap().is_none(),
            "{name}"
        );

        let err = store
            .upload("avatars", "../secrets", b"x".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{name}: traversal rejected");
    }
}

#[tokio::test]
async fn timed_store_cuts_off_slow_calls() {
    let slow: Arc<dyn RecordStore> =
        Arc::new(MemoryStore::new(standard_rules()).with_latency(300));
    let bounded = TimedStore::new(slow, Duration::from_millis(30));

    let err = bounded
        .insert("guides", json!({ "item_name": "Radio" }))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Timeout(_)));
}

#[tokio::test]
async fn open_factory_wires_latency_and_timeout() {
    let config = StoreConfig {
        url: "memory:".to_string(),
        timeout_secs: 5,
        simulated_latency_ms: 5,
        seed_demo: false,
    };
    let store = store::open(&config, 64).await.unwrap();

    // Latency is jittered but far below the deadline, so calls succeed.
    let record = store
        .insert("guides", json!({ "item_name": "Mixer" }))
        .await
        .unwrap();
    assert!(record["id"].as_str().is_some());

    let err = store::open(
        &StoreConfig {
            url: "postgres://nope".to_string(),
            timeout_secs: 5,
            simulated_latency_ms: 0,
            seed_demo: false,
        },
        64,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
