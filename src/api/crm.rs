use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::error::ApiError;
use super::metrics::record_lead_forwarded;
use crate::lead::{self, LeadEvent, LeadMeta};
use crate::mail::OutgoingEmail;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CrmResponse {
    pub success: bool,
    pub message: String,
}

/// Forward a service drive entry to the CRM as an ADF/XML lead email
///
/// POST /api/send-to-crm
pub async fn send_to_crm(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LeadEvent>, JsonRejection>,
) -> Result<Json<CrmResponse>, ApiError> {
    let Json(event) = payload?;

    let crm = &state.config.crm;
    if crm.lead_address.is_empty() {
        return Err(ApiError::not_configured("CRM lead address is not configured"));
    }

    let lead = lead::format(&event, &LeadMeta::now(crm));
    let email = OutgoingEmail {
        to: vec![crm.lead_address.clone()],
        subject: lead.subject,
        html: lead.html,
        text: Some(lead.text),
    };

    if let Err(e) = state.mailer.send(&email).await {
        record_lead_forwarded("failed");
        return Err(e.into());
    }

    record_lead_forwarded("sent");
    info!(
        prospect = %lead.prospect_name,
        entry_id = event.id.as_deref().unwrap_or_default(),
        "Lead forwarded to CRM"
    );

    Ok(Json(CrmResponse {
        success: true,
        message: format!("Lead pushed to CRM for {}", lead.prospect_name),
    }))
}
