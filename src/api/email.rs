use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use crate::mail::{deserialize_recipients, DeliveryError, OutgoingEmail};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    #[serde(deserialize_with = "deserialize_recipients")]
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendEmailResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendEmailResponse {
    fn failed(status: StatusCode, error: String) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                success: false,
                id: None,
                error: Some(error),
            }),
        )
    }
}

/// Send an arbitrary transactional email
///
/// POST /api/send-email
///
/// A message the provider refuses is the caller's problem (400); failing to
/// reach the provider is ours (500).
pub async fn send_email(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SendEmailRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SendEmailResponse>), ApiError> {
    let Json(request) = payload?;
    if request.to.is_empty() {
        return Err(ApiError::bad_request("No recipients"));
    }

    let email = OutgoingEmail {
        to: request.to,
        subject: request.subject,
        html: request.html,
        text: request.text,
    };

    Ok(match state.mailer.send(&email).await {
        Ok(sent) => (
            StatusCode::OK,
            Json(SendEmailResponse {
                success: true,
                id: Some(sent.id),
                error: None,
            }),
        ),
        Err(DeliveryError::Rejected { message, .. }) => {
            tracing::info!(error = %message, "Mail provider rejected message");
            SendEmailResponse::failed(StatusCode::BAD_REQUEST, message)
        }
        Err(e) => {
            tracing::error!(error = %e, "Email send failed");
            SendEmailResponse::failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    })
}
