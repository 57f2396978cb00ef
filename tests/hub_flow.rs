// End-to-end domain flows through the hub: posting, threading, voting,
// following, badges, moderation and the cleanup that ties them together.

use std::sync::Arc;

use serde_json::json;

use repairhub::error::AppError;
use repairhub::hub::Hub;
use repairhub::models::{
    collections, decode, NewGuide, NewPost, NewReport, NotificationKind, Profile, ReportReason,
    ReportStatus, ReportTargetType,
};
use repairhub::store::{standard_rules, Filter, MemoryStore, RecordStore};

async fn hub() -> Arc<Hub> {
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new(standard_rules()));
    Arc::new(Hub::new(store, 64).await.unwrap())
}

async fn user(hub: &Hub, name: &str) -> Profile {
    let (_token, profile) = hub
        .register(&format!("{name}@example.com"), name, "password123")
        .await
        .unwrap();
    profile
}

async fn admin(hub: &Hub) -> Profile {
    let fixer = user(hub, "admin").await;
    hub.store()
        .update(collections::PROFILES, &fixer.id, json!({ "is_admin": true }))
        .await
        .unwrap();
    hub.get_user(&fixer.id).await.unwrap()
}

fn new_post(item_name: &str) -> NewPost {
    NewPost {
        item_name: item_name.to_string(),
        issue_description: Some("would not power on".to_string()),
        repair_steps: Some("replaced the fuse".to_string()),
        success: true,
        date: "2025-08-01".to_string(),
        images: Vec::new(),
        category_id: None,
    }
}

#[tokio::test]
async fn posting_commenting_and_voting_notify_the_right_people() {
    let hub = hub().await;
    let alice = user(&hub, "alice").await;
    let bob = user(&hub, "bob").await;
    let charlie = user(&hub, "charlie").await;

    let post = hub.create_post(&alice, new_post("Toaster")).await.unwrap();
    let badges = hub.badges_for(&alice.id).await.unwrap();
    assert!(badges.iter().any(|b| b.slug == "first-repair"));

    let comment = hub
        .add_comment(&bob, &post.post.id, "Check the heating element too.", None)
        .await
        .unwrap();
    let reply = hub
        .add_comment(&alice, &post.post.id, "Good call, will do.", Some(&comment.id))
        .await
        .unwrap();
    assert_eq!(reply.parent_id.as_deref(), Some(comment.id.as_str()));

    let alice_inbox = hub.notifications_for(&alice).await.unwrap();
    assert!(alice_inbox
        .iter()
        .any(|n| n.kind == NotificationKind::Comment && n.actor_id == bob.id));
    let bob_inbox = hub.notifications_for(&bob).await.unwrap();
    assert!(bob_inbox
        .iter()
        .any(|n| n.kind == NotificationKind::Reply && n.actor_id == alice.id));

    hub.toggle_vote(&bob, &post.post.id).await.unwrap();
    hub.toggle_vote(&charlie, &post.post.id).await.unwrap();
    let view = hub.get_post(None, &post.post.id).await.unwrap();
    assert_eq!(view.vote_count, 2);

    // Retracting goes through a recount, not a decrement of a cached number.
    hub.toggle_vote(&bob, &post.post.id).await.unwrap();
    let view = hub.get_post(Some(&charlie), &post.post.id).await.unwrap();
    assert_eq!(view.vote_count, 1);
    assert!(view.user_has_voted);

    hub.toggle_bookmark(&charlie, &post.post.id).await.unwrap();
    let saved = hub.bookmarked_posts(&charlie).await.unwrap();
    assert_eq!(saved.len(), 1);
    assert!(saved[0].user_has_bookmarked);

    let unread = hub.unread_count(&alice).await.unwrap();
    assert!(unread >= 2, "comment plus upvotes");
    let flipped = hub.mark_all_read(&alice).await.unwrap();
    assert_eq!(flipped, unread);
    assert_eq!(hub.unread_count(&alice).await.unwrap(), 0);
}

#[tokio::test]
async fn follows_count_and_notify() {
    let hub = hub().await;
    let alice = user(&hub, "alice").await;
    let bob = user(&hub, "bob").await;

    let outcome = hub.toggle_follow(&bob, &alice.id).await.unwrap();
    assert!(outcome.active);
    assert_eq!(hub.follower_count(&alice.id).await.unwrap(), 1);
    assert_eq!(hub.following_count(&bob.id).await.unwrap(), 1);
    assert!(hub
        .followers(&alice.id)
        .await
        .unwrap()
        .iter()
        .any(|p| p.id == bob.id));

    let inbox = hub.notifications_for(&alice).await.unwrap();
    assert!(inbox
        .iter()
        .any(|n| n.kind == NotificationKind::Follow && n.actor_id == bob.id));

    let outcome = hub.toggle_follow(&bob, &alice.id).await.unwrap();
    assert!(!outcome.active);
    assert_eq!(hub.follower_count(&alice.id).await.unwrap(), 0);

    let err = hub.toggle_follow(&bob, &bob.id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn trending_ranks_recent_posts_by_votes() {
    let hub = hub().await;
    let alice = user(&hub, "alice").await;
    let bob = user(&hub, "bob").await;
    let charlie = user(&hub, "charlie").await;

    let quiet = hub.create_post(&alice, new_post("Toaster")).await.unwrap();
    let popular = hub.create_post(&bob, new_post("Headphones")).await.unwrap();
    hub.toggle_vote(&alice, &popular.post.id).await.unwrap();
    hub.toggle_vote(&charlie, &popular.post.id).await.unwrap();
    hub.toggle_vote(&charlie, &quiet.post.id).await.unwrap();

    let trending = hub.trending(None).await.unwrap();
    assert_eq!(trending.len(), 2);
    assert_eq!(trending[0].post.id, popular.post.id);
    assert_eq!(trending[0].vote_count, 2);
    assert_eq!(trending[1].post.id, quiet.post.id);
}

#[tokio::test]
async fn banned_users_cannot_create_content() {
    let hub = hub().await;
    let moderator = admin(&hub).await;
    let bob = user(&hub, "bob").await;
    let post = hub.create_post(&bob, new_post("Toaster")).await.unwrap();

    let banned = hub.set_banned(&moderator, &bob.id, true).await.unwrap();
    assert!(banned.is_banned);
    let bob = hub.get_user(&bob.id).await.unwrap();

    let err = hub.create_post(&bob, new_post("Kettle")).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    let err = hub
        .add_comment(&bob, &post.post.id, "still here", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    let err = hub
        .create_guide(
            &bob,
            NewGuide {
                item_name: "Kettle".to_string(),
                guide_content: "descale monthly".to_string(),
                date: "2025-08-01".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Lifting the ban restores write access.
    hub.set_banned(&moderator, &bob.id, false).await.unwrap();
    let bob = hub.get_user(&bob.id).await.unwrap();
    hub.create_post(&bob, new_post("Kettle")).await.unwrap();

    let err = hub
        .set_banned(&moderator, &moderator.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn reports_are_admin_only_to_read_and_resolve() {
    let hub = hub().await;
    let moderator = admin(&hub).await;
    let alice = user(&hub, "alice").await;
    let bob = user(&hub, "bob").await;

    let post = hub.create_post(&alice, new_post("Toaster")).await.unwrap();
    let comment = hub
        .add_comment(&bob, &post.post.id, "buy a new one lol", None)
        .await
        .unwrap();

    let report = hub
        .submit_report(
            &alice,
            NewReport {
                target_type: ReportTargetType::Comment,
                target_id: comment.id.clone(),
                reason: ReportReason::Spam,
                description: Some("not helpful".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(report.status, ReportStatus::Open);
    assert_eq!(report.reporter_id, alice.id);

    let err = hub.list_reports(&alice).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let reports = hub.list_reports(&moderator).await.unwrap();
    assert_eq!(reports.len(), 1);

    let resolved = hub
        .resolve_report(&moderator, &report.id, ReportStatus::Resolved)
        .await
        .unwrap();
    assert_eq!(resolved.status, ReportStatus::Resolved);

    // Reporting something that does not exist is refused outright.
    let err = hub
        .submit_report(
            &bob,
            NewReport {
                target_type: ReportTargetType::Post,
                target_id: "missing".to_string(),
                reason: ReportReason::Other,
                description: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn admin_stats_tally_the_store() {
    let hub = hub().await;
    let moderator = admin(&hub).await;
    let alice = user(&hub, "alice").await;

    let post = hub.create_post(&alice, new_post("Toaster")).await.unwrap();
    hub.add_comment(&alice, &post.post.id, "follow-up: fuse was fine", None)
        .await
        .unwrap();
    hub.create_guide(
        &alice,
        NewGuide {
            item_name: "Toaster".to_string(),
            guide_content: "Unplug, open, check the fuse and the element.".to_string(),
            date: "2025-08-01".to_string(),
        },
    )
    .await
    .unwrap();

    let stats = hub.stats(&moderator).await.unwrap();
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.total_posts, 1);
    assert_eq!(stats.total_comments, 1);
    assert_eq!(stats.total_guides, 1);

    let err = hub.stats(&alice).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn deleting_a_post_cascades_to_everything_attached() {
    let hub = hub().await;
    let alice = user(&hub, "alice").await;
    let bob = user(&hub, "bob").await;

    let post = hub.create_post(&alice, new_post("Toaster")).await.unwrap();
    let post_id = post.post.id.clone();
    let top = hub
        .add_comment(&bob, &post_id, "Check the element.", None)
        .await
        .unwrap();
    hub.add_comment(&alice, &post_id, "Will do.", Some(&top.id))
        .await
        .unwrap();
    hub.toggle_vote(&bob, &post_id).await.unwrap();
    hub.toggle_bookmark(&bob, &post_id).await.unwrap();

    // Only the owner or an admin may remove it.
    let err = hub.delete_post(&bob, &post_id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    hub.delete_post(&alice, &post_id).await.unwrap();
    let err = hub.get_post(None, &post_id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let store = hub.store();
    let leftover = Filter::new().eq("repair_post_id", post_id.as_str());
    assert_eq!(store.count(collections::COMMENTS, &leftover).await.unwrap(), 0);
    assert_eq!(store.count(collections::VOTES, &leftover).await.unwrap(), 0);
    assert_eq!(store.count(collections::BOOKMARKS, &leftover).await.unwrap(), 0);
}

#[tokio::test]
async fn deleting_a_comment_takes_its_whole_reply_chain() {
    let hub = hub().await;
    let alice = user(&hub, "alice").await;
    let bob = user(&hub, "bob").await;

    let post = hub.create_post(&alice, new_post("Toaster")).await.unwrap();
    let a = hub
        .add_comment(&bob, &post.post.id, "top", None)
        .await
        .unwrap();
    let b = hub
        .add_comment(&alice, &post.post.id, "reply", Some(&a.id))
        .await
        .unwrap();
    let c = hub
        .add_comment(&bob, &post.post.id, "reply to reply", Some(&b.id))
        .await
        .unwrap();
    let unrelated = hub
        .add_comment(&alice, &post.post.id, "separate thread", None)
        .await
        .unwrap();

    // Deleting the middle of the chain takes it and its descendant.
    let deletion = hub.delete_comment(&alice, &b.id).await.unwrap();
    let mut expected = vec![b.id.clone(), c.id.clone()];
    expected.sort();
    assert_eq!(deletion.deleted_ids, expected);

    let remaining = hub.comments_for_post(&post.post.id).await.unwrap();
    let ids: Vec<&str> = remaining.iter().map(|c| c.id.as_str()).collect();
    assert!(ids.contains(&a.id.as_str()));
    assert!(ids.contains(&unrelated.id.as_str()));
    assert_eq!(ids.len(), 2);
}

#[tokio::test]
async fn profile_updates_are_whitelisted() {
    let hub = hub().await;
    let alice = user(&hub, "alice").await;
    let bob = user(&hub, "bob").await;

    let updated = hub
        .update_profile(
            &bob,
            json!({
                "bio": "toaster whisperer",
                "is_admin": true,
                "is_banned": false,
                "id": "forged",
            }),
        )
        .await
        .unwrap();
    assert_eq!(updated.bio.as_deref(), Some("toaster whisperer"));
    assert!(!updated.is_admin, "privilege fields never pass through");
    assert_eq!(updated.id, bob.id);

    let err = hub
        .update_profile(&bob, json!({ "username": alice.username }))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let decoded: Profile = decode(
        hub.store()
            .get(collections::PROFILES, &bob.id)
            .await
            .unwrap()
            .unwrap(),
    )
    .unwrap();
    assert!(!decoded.is_admin);
}

#[tokio::test]
async fn contributor_and_helpful_badges_arrive_at_their_thresholds() {
    let hub = hub().await;
    let alice = user(&hub, "alice").await;
    let bob = user(&hub, "bob").await;

    let mut first_post_id = None;
    for i in 0..5 {
        let view = hub
            .create_post(&alice, new_post(&format!("Gadget {i}")))
            .await
            .unwrap();
        first_post_id.get_or_insert(view.post.id);
    }
    let slugs: Vec<String> = hub
        .badges_for(&alice.id)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.slug)
        .collect();
    assert!(slugs.contains(&"first-repair".to_string()));
    assert!(slugs.contains(&"contributor".to_string()));

    let post_id = first_post_id.unwrap();
    for i in 0..10 {
        hub.add_comment(&bob, &post_id, &format!("tip number {i}"), None)
            .await
            .unwrap();
    }
    let slugs: Vec<String> = hub
        .badges_for(&bob.id)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.slug)
        .collect();
    assert!(slugs.contains(&"helpful".to_string()));
}
