use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::ApiError;
use crate::lead::LeadEvent;
use crate::store::NewSubscription;
use crate::utils::lenient;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PushNotifyRequest {
    #[serde(default)]
    pub entry: Option<LeadEvent>,
}

#[derive(Debug, Serialize)]
pub struct PushNotifyResponse {
    pub success: bool,
    pub sent: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Notify every subscribed device about a new entry
///
/// POST /api/push-notify
pub async fn push_notify(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PushNotifyRequest>, JsonRejection>,
) -> Result<Json<PushNotifyResponse>, ApiError> {
    let Json(request) = payload?;
    let entry = request
        .entry
        .ok_or_else(|| ApiError::bad_request("No entry data"))?;

    let dispatcher = state
        .dispatcher
        .as_ref()
        .ok_or_else(|| ApiError::not_configured("Web push is not configured"))?;

    let report = dispatcher.dispatch(&entry).await.map_err(|e| {
        ApiError::upstream("Failed to fetch subscriptions").with_detail(e.to_string())
    })?;

    Ok(Json(PushNotifyResponse {
        success: true,
        sent: report.sent,
        total: report.total,
        message: (report.total == 0).then(|| "No subscribers yet".to_string()),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    #[serde(default)]
    pub subscription: Option<Value>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub user_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub success: bool,
}

/// Store a browser push subscription
///
/// POST /api/save-subscription
pub async fn save_subscription(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubscriptionRequest>, JsonRejection>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let Json(request) = payload?;
    let subscription = request
        .subscription
        .and_then(|s| NewSubscription::new(s, request.user_id, request.user_name))
        .ok_or_else(|| ApiError::bad_request("No subscription data"))?;

    state.subscriptions.save(&subscription).await.map_err(|e| {
        ApiError::upstream("Failed to save subscription").with_detail(e.to_string())
    })?;

    info!(
        user = subscription.user_name.as_deref().unwrap_or_default(),
        "Push subscription saved"
    );
    Ok(Json(SubscriptionResponse { success: true }))
}

/// Forget a browser push subscription; succeeds even if the store call fails
///
/// DELETE /api/save-subscription
pub async fn remove_subscription(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubscriptionRequest>, JsonRejection>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let Json(request) = payload?;
    let endpoint = request
        .subscription
        .as_ref()
        .and_then(|s| s.get("endpoint"))
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request("No subscription data"))?;

    if let Err(e) = state.subscriptions.remove(endpoint).await {
        warn!(error = %e, "Failed to remove push subscription");
    }
    Ok(Json(SubscriptionResponse { success: true }))
}
