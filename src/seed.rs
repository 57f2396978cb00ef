//! Demo content for a fresh store. Everything flows through the regular
//! sign-up and hub operations, so seeded data carries the same badges,
//! notifications and counts a live community would have produced.

use std::collections::HashMap;

use serde_json::json;
use tracing::info;

use crate::error::AppResult;
use crate::hub::Hub;
use crate::models::{collections, decode, NewGuide, NewPost, Profile};
use crate::store::{record_id, Filter};

const DEMO_PASSWORD: &str = "password123";

pub async fn seed_demo_data(hub: &Hub) -> AppResult<()> {
    let store = hub.store();

    // Never reseed a store that already has users.
    if store.count(collections::PROFILES, &Filter::new()).await? > 0 {
        info!("store already populated, skipping demo seed");
        return Ok(());
    }

    let people = [
        ("alice", "alice@repairhub.dev", "Fixes phones and laptops so they stay out of the landfill."),
        ("bob", "bob@repairhub.dev", "Console tinkerer. If it has a controller, I have opened it."),
        ("charlie", "charlie@repairhub.dev", "Household electronics and the occasional espresso machine."),
    ];

    let mut profiles: Vec<Profile> = Vec::new();
    for (username, email, bio) in people {
        let session = store.sign_up(email, username, DEMO_PASSWORD).await?;
        let profile: Profile = decode(session.user)?;
        store
            .update(
                collections::PROFILES,
                &profile.id,
                json!({
                    "bio": bio,
                    "avatar_url": format!("https://api.dicebear.com/7.x/avataaars/svg?seed={}", username),
                }),
            )
            .await?;
        profiles.push(profile);
    }

    let admin_session = store
        .sign_up("admin@repairhub.dev", "admin", DEMO_PASSWORD)
        .await?;
    let admin: Profile = decode(admin_session.user)?;
    store
        .update(
            collections::PROFILES,
            &admin.id,
            json!({ "is_admin": true }),
        )
        .await?;

    let mut category_ids: HashMap<&str, String> = HashMap::new();
    for name in ["Smartphones", "Laptops", "Game Consoles", "Home Appliances"] {
        let record = store
            .insert(collections::CATEGORIES, json!({ "name": name }))
            .await?;
        category_ids.insert(name, record_id(&record)?);
    }

    let alice = &profiles[0];
    let bob = &profiles[1];
    let charlie = &profiles[2];

    let iphone = hub
        .create_post(
            alice,
            NewPost {
                item_name: "iPhone 13".to_string(),
                issue_description: Some(
                    "Cracked screen after a drop. Touch still worked but glass shards kept coming loose.".to_string(),
                ),
                repair_steps: Some(
                    "Heated the edges to soften the adhesive, lifted the old panel with a suction cup, transferred the Face ID sensor and fitted a new display assembly.".to_string(),
                ),
                success: true,
                date: "2025-06-14".to_string(),
                images: Vec::new(),
                category_id: category_ids.get("Smartphones").cloned(),
            },
        )
        .await?;

    let switch = hub
        .create_post(
            bob,
            NewPost {
                item_name: "Nintendo Switch".to_string(),
                issue_description: Some(
                    "Left Joy-Con drifting upward even after recalibration.".to_string(),
                ),
                repair_steps: Some(
                    "Opened the Joy-Con, cleaned the stick contacts with isopropyl, then swapped the analog module for a hall effect one.".to_string(),
                ),
                success: true,
                date: "2025-07-02".to_string(),
                images: Vec::new(),
                category_id: category_ids.get("Game Consoles").cloned(),
            },
        )
        .await?;

    hub.create_post(
        charlie,
        NewPost {
            item_name: "Dell XPS 15".to_string(),
            issue_description: Some(
                "Thermal shutdowns under load, fans screaming at idle.".to_string(),
            ),
            repair_steps: Some(
                "Repasted the CPU and GPU, cleaned the heatsink fins and replaced one seized fan.".to_string(),
            ),
            success: false,
            date: "2025-07-21".to_string(),
            images: Vec::new(),
            category_id: category_ids.get("Laptops").cloned(),
        },
    )
    .await?;

    // A small threaded conversation on the iPhone post.
    let praise = hub
        .add_comment(
            bob,
            &iphone.post.id,
            "Great walkthrough. The heating tip saved my replacement panel.",
            None,
        )
        .await?;
    hub.add_comment(
        alice,
        &iphone.post.id,
        "Glad it helped! Go slow around the corners, that is where panels crack.",
        Some(&praise.id),
    )
    .await?;
    hub.add_comment(
        charlie,
        &switch.post.id,
        "Did you try contact cleaner first? Mine drifted again after a month of that.",
        None,
    )
    .await?;

    hub.create_guide(
        alice,
        NewGuide {
            item_name: "iPhone 13".to_string(),
            guide_content: "Screen replacement essentials: heat to 80C along the edges, pull from the bottom, never pry near the camera notch, and keep every bracket screw sorted by length.".to_string(),
            date: "2025-06-20".to_string(),
        },
    )
    .await?;
    hub.create_guide(
        charlie,
        NewGuide {
            item_name: "Dell XPS 15".to_string(),
            guide_content: "Thermal service: Torx T5 for the bottom plate, clean old paste with isopropyl, apply a rice grain per die and check both fan connectors before closing up.".to_string(),
            date: "2025-07-25".to_string(),
        },
    )
    .await?;

    hub.toggle_vote(bob, &iphone.post.id).await?;
    hub.toggle_vote(charlie, &iphone.post.id).await?;
    hub.toggle_vote(alice, &switch.post.id).await?;
    hub.toggle_bookmark(charlie, &iphone.post.id).await?;

    hub.toggle_follow(bob, &alice.id).await?;
    hub.toggle_follow(charlie, &alice.id).await?;
    hub.toggle_follow(alice, &bob.id).await?;

    info!(
        users = profiles.len() + 1,
        categories = category_ids.len(),
        "seeded demo data"
    );
    Ok(())
}
