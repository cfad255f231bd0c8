use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{DeliveryError, Mailer, OutgoingEmail, SentEmail};
use crate::config::MailConfig;

/// Transactional email over the Resend HTTP API.
pub struct ResendMailer {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    #[serde(flatten)]
    email: &'a OutgoingEmail,
}

#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ResendMailer {
    pub fn new(config: &MailConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail, DeliveryError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(DeliveryError::NotConfigured("mail API key"))?;

        let response = self
            .http
            .post(format!("{}/emails", self.api_url))
            .bearer_auth(api_key)
            .json(&SendRequest {
                from: &self.from,
                email,
            })
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        let body: SendResponse = response.json().await.unwrap_or_default();

        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: Some(status.as_u16()),
                message: body
                    .message
                    .unwrap_or_else(|| format!("Mail provider responded with {status}")),
            });
        }

        let id = body.id.unwrap_or_default();
        tracing::info!(
            id = %id,
            recipients = email.to.len(),
            subject = %email.subject,
            "Email sent successfully"
        );
        Ok(SentEmail { id })
    }
}
