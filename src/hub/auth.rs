use serde_json::Value;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::hub::Hub;
use crate::models::{collections, decode, decode_all, Profile};
use crate::store::{Filter, Order};

// Fields a user may change on their own profile.
const PROFILE_FIELDS: &[&str] = &["username", "bio", "avatar_url"];

impl Hub {
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> AppResult<(String, Profile)> {
        let session = self.store.sign_up(email, username, password).await?;
        let profile: Profile = decode(session.user)?;
        info!(user_id = %profile.id, username = %profile.username, "registered new user");
        Ok((session.token, profile))
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<(String, Profile)> {
        let session = self.store.sign_in(email, password).await?;
        let profile: Profile = decode(session.user)?;
        info!(user_id = %profile.id, "user signed in");
        Ok((session.token, profile))
    }

    pub async fn logout(&self, token: &str) -> AppResult<()> {
        self.store.sign_out(token).await
    }

    pub async fn current_user(&self, token: &str) -> AppResult<Option<Profile>> {
        self.maybe_viewer(token).await
    }

    pub async fn list_users(&self) -> AppResult<Vec<Profile>> {
        let users = self
            .store
            .select(
                collections::PROFILES,
                &Filter::new(),
                &Order::asc("created_at"),
            )
            .await?;
        decode_all(users)
    }

    pub async fn get_user(&self, id: &str) -> AppResult<Profile> {
        let user = self.ensure_exists(collections::PROFILES, id).await?;
        decode(user)
    }

    /// Self-service profile edit: anything outside the editable field set is
    /// dropped before the merge, so a crafted patch cannot grant admin.
    pub async fn update_profile(&self, viewer: &Profile, mut patch: Value) -> AppResult<Profile> {
        if let Some(fields) = patch.as_object_mut() {
            fields.retain(|key, _| PROFILE_FIELDS.contains(&key.as_str()));
        }
        let empty = patch.as_object().map(|o| o.is_empty()).unwrap_or(true);
        if empty {
            return Err(AppError::Validation(
                "nothing to update: editable fields are username, bio and avatar_url".to_string(),
            ));
        }
        let updated = self
            .store
            .update(collections::PROFILES, &viewer.id, patch)
            .await?;
        decode(updated)
    }
}
