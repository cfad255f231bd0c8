//! Page session endpoints. Pages post whatever credentials they hold and get
//! back either an identity to render with or a redirect to follow.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::{
    AuthMode, AuthOutcome, LegacyRecord, MemorySessionCache, Redirect, RedirectReason,
    RequiredRoles, UserIdentity,
};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SessionRequest {
    #[serde(default)]
    pub access_token: Option<String>,
    /// The page's cached `sb_rep` record
    #[serde(default)]
    pub legacy: Option<LegacyRecord>,
    #[serde(default)]
    pub required_role: RequiredRoles,
    /// Path of the page asking
    #[serde(default)]
    pub page: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub success: bool,
    pub mode: AuthMode,
    pub user: UserIdentity,
    /// Session storage entries the page should hold afterwards
    pub cache: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct RedirectResponse {
    pub redirect: String,
    pub reason: RedirectReason,
    pub suppressed: bool,
}

impl From<Redirect> for RedirectResponse {
    fn from(redirect: Redirect) -> Self {
        Self {
            redirect: redirect.target,
            reason: redirect.reason,
            suppressed: redirect.suppressed,
        }
    }
}

fn redirect_status(reason: RedirectReason) -> StatusCode {
    match reason {
        RedirectReason::Forbidden => StatusCode::FORBIDDEN,
        RedirectReason::Unauthenticated => StatusCode::UNAUTHORIZED,
        RedirectReason::SignedOut => StatusCode::OK,
    }
}

/// Resolve the caller's session
///
/// POST /api/session
pub async fn resolve_session(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SessionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;

    let cache = match &request.legacy {
        Some(record) => MemorySessionCache::with_legacy(record),
        None => MemorySessionCache::new(),
    };

    let outcome = state
        .sessions
        .resolve(
            request.access_token.as_deref(),
            &cache,
            &request.required_role,
            request.page.as_deref(),
        )
        .await;

    Ok(match outcome {
        AuthOutcome::Authenticated(context) => Json(SessionResponse {
            success: true,
            mode: context.mode,
            user: context.identity,
            cache: cache.snapshot(),
        })
        .into_response(),
        AuthOutcome::Redirect(redirect) => (
            redirect_status(redirect.reason),
            Json(RedirectResponse::from(redirect)),
        )
            .into_response(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct SignOutRequest {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
}

/// Revoke the caller's token and send them to login
///
/// POST /api/sign-out
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SignOutRequest>, JsonRejection>,
) -> Result<Json<RedirectResponse>, ApiError> {
    let Json(request) = payload?;
    let cache = MemorySessionCache::new();
    let redirect = state
        .sessions
        .sign_out(request.access_token.as_deref(), &cache, request.page.as_deref())
        .await;
    Ok(Json(redirect.into()))
}
