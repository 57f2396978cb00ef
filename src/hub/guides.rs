use serde_json::{json, Value};
use tracing::info;

use crate::error::AppResult;
use crate::hub::{ensure_not_banned, ensure_owner, ensure_owner_or_admin, non_empty, strip_protected, Hub};
use crate::models::{collections, decode, decode_all, Category, Guide, NewGuide, Profile};
use crate::store::{Filter, Order};

impl Hub {
    pub async fn list_guides(&self, search: Option<&str>) -> AppResult<Vec<Guide>> {
        let mut filter = Filter::new();
        if let Some(needle) = search.map(str::trim).filter(|s| !s.is_empty()) {
            filter = filter.contains_any(&["item_name", "guide_content"], needle);
        }
        let records = self
            .store
            .select(collections::GUIDES, &filter, &Order::desc("created_at"))
            .await?;
        decode_all(records)
    }

    pub async fn get_guide(&self, id: &str) -> AppResult<Guide> {
        decode(self.ensure_exists(collections::GUIDES, id).await?)
    }

    pub async fn create_guide(&self, viewer: &Profile, input: NewGuide) -> AppResult<Guide> {
        ensure_not_banned(viewer)?;
        non_empty(&input.item_name, "item name")?;
        non_empty(&input.guide_content, "guide content")?;

        let mut document = serde_json::to_value(&input)?;
        if let Some(fields) = document.as_object_mut() {
            fields.insert("user_id".to_string(), Value::String(viewer.id.clone()));
        }
        let record = self.store.insert(collections::GUIDES, document).await?;
        let guide: Guide = decode(record)?;
        info!(guide_id = %guide.id, user_id = %viewer.id, "created guide");
        Ok(guide)
    }

    pub async fn update_guide(
        &self,
        viewer: &Profile,
        id: &str,
        mut patch: Value,
    ) -> AppResult<Guide> {
        let guide: Guide = decode(self.ensure_exists(collections::GUIDES, id).await?)?;
        ensure_owner(viewer, &guide.user_id, "guide")?;
        strip_protected(&mut patch, &["id", "created_at", "user_id"]);
        decode(self.store.update(collections::GUIDES, id, patch).await?)
    }

    pub async fn delete_guide(&self, viewer: &Profile, id: &str) -> AppResult<()> {
        let guide: Guide = decode(self.ensure_exists(collections::GUIDES, id).await?)?;
        ensure_owner_or_admin(viewer, &guide.user_id, "guide")?;
        self.store.delete(collections::GUIDES, id).await?;
        info!(guide_id = %id, user_id = %viewer.id, "deleted guide");
        Ok(())
    }

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        let records = self
            .store
            .select(collections::CATEGORIES, &Filter::new(), &Order::asc("name"))
            .await?;
        decode_all(records)
    }

    // Category writes are an admin capability; regular members only read.

    pub async fn create_category(
        &self,
        viewer: &Profile,
        name: &str,
        icon: Option<&str>,
    ) -> AppResult<Category> {
        self.require_admin(viewer)?;
        let name = non_empty(name, "category name")?;
        let record = self
            .store
            .insert(collections::CATEGORIES, json!({ "name": name, "icon": icon }))
            .await?;
        decode(record)
    }

    pub async fn update_category(
        &self,
        viewer: &Profile,
        id: &str,
        mut patch: Value,
    ) -> AppResult<Category> {
        self.require_admin(viewer)?;
        self.ensure_exists(collections::CATEGORIES, id).await?;
        strip_protected(&mut patch, &["id", "created_at"]);
        decode(self.store.update(collections::CATEGORIES, id, patch).await?)
    }

    pub async fn delete_category(&self, viewer: &Profile, id: &str) -> AppResult<()> {
        self.require_admin(viewer)?;
        self.ensure_exists(collections::CATEGORIES, id).await?;
        self.store.delete(collections::CATEGORIES, id).await?;
        Ok(())
    }
}
