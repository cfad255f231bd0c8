//! Outbound mail.
//!
//! Two transports share one contract: a transactional email HTTP API and
//! plain SMTP. Neither retries; a rejected message surfaces as
//! [`DeliveryError`] carrying whatever the provider said.

mod resend;
mod smtp;

pub use resend::ResendMailer;
pub use smtp::SmtpMailer;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{MailConfig, MailTransport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub id: String,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The provider answered and refused the message
    #[error("{message}")]
    Rejected { status: Option<u16>, message: String },
    /// The provider could not be reached or the message could not be built
    #[error("mail transport failed: {0}")]
    Transport(String),
    #[error("mail transport is not configured: {0}")]
    NotConfigured(&'static str),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail, DeliveryError>;
}

/// Build the configured transport.
pub fn from_config(config: &MailConfig) -> Arc<dyn Mailer> {
    match config.transport {
        MailTransport::Resend => Arc::new(ResendMailer::new(config)),
        MailTransport::Smtp => Arc::new(SmtpMailer::new(config.clone())),
    }
}

/// Accept a single address or a list of them, as browsers send either.
pub fn deserialize_recipients<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(to) => vec![to],
        OneOrMany::Many(to) => to,
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Body {
        #[serde(deserialize_with = "deserialize_recipients")]
        to: Vec<String>,
    }

    #[test]
    fn test_recipients_one_or_many() {
        let one: Body = serde_json::from_str(r#"{"to": "a@example.com"}"#).unwrap();
        assert_eq!(one.to, vec!["a@example.com"]);
        let many: Body = serde_json::from_str(r#"{"to": ["a@example.com", "b@example.com"]}"#).unwrap();
        assert_eq!(many.to.len(), 2);
    }

    #[test]
    fn test_outgoing_email_json() {
        let email = OutgoingEmail {
            to: vec!["a@example.com".to_string()],
            subject: "Hi".to_string(),
            html: "<p>Hi</p>".to_string(),
            text: None,
        };
        let value = serde_json::to_value(&email).unwrap();
        assert_eq!(value["to"][0], "a@example.com");
        assert!(value.get("text").is_none());
    }

    #[test]
    fn test_rejection_displays_provider_message() {
        let err = DeliveryError::Rejected {
            status: Some(422),
            message: "Invalid `to` field".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid `to` field");
    }
}
