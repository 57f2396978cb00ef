//! Axum extractors that turn the bearer token into a viewer profile.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};

use crate::app_state::AppState;
use crate::error::AppError;
use crate::models::Profile;

/// Signed-in caller. Rejects the request when the token is missing or no
/// longer maps to a live session.
pub struct Viewer(pub Profile);

/// Caller for endpoints that also render for anonymous visitors. A missing
/// or stale token lands as `None` instead of an error.
pub struct MaybeViewer(pub Option<Profile>);

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::NotAuthenticated("please sign in".to_string()))?;
        let profile = state.hub.viewer_from_token(&token).await?;
        Ok(Viewer(profile))
    }
}

impl FromRequestParts<AppState> for MaybeViewer {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        match bearer_token(&parts.headers) {
            Some(token) => Ok(MaybeViewer(state.hub.maybe_viewer(&token).await?)),
            None => Ok(MaybeViewer(None)),
        }
    }
}
