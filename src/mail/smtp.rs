use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{DeliveryError, Mailer, OutgoingEmail, SentEmail};
use crate::config::MailConfig;

/// Mail over an authenticated SMTP relay.
pub struct SmtpMailer {
    config: MailConfig,
}

impl SmtpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<(Message, String), DeliveryError> {
        let from: Mailbox = self
            .config
            .from
            .parse()
            .map_err(|e| DeliveryError::Transport(format!("invalid sender: {e}")))?;

        let message_id = format!("<{}@servicebridge>", uuid::Uuid::new_v4());
        let mut builder = Message::builder()
            .from(from)
            .subject(email.subject.clone())
            .message_id(Some(message_id.clone()));

        for to in &email.to {
            let to: Mailbox = to
                .parse()
                .map_err(|e| DeliveryError::Rejected {
                    status: None,
                    message: format!("invalid recipient {to}: {e}"),
                })?;
            builder = builder.to(to);
        }

        let html = SinglePart::builder()
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone());

        let message = match &email.text {
            Some(text) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.clone()),
                    )
                    .singlepart(html),
            ),
            None => builder.singlepart(html),
        }
        .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        Ok((message, message_id))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail, DeliveryError> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or(DeliveryError::NotConfigured("SMTP host"))?;

        let (message, message_id) = self.build_message(email)?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
                .map_err(|e| DeliveryError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        let response = mailer.build().send(message).await.map_err(|e| {
            if e.is_permanent() {
                DeliveryError::Rejected {
                    status: None,
                    message: e.to_string(),
                }
            } else {
                DeliveryError::Transport(e.to_string())
            }
        })?;

        tracing::info!(
            message_id = %message_id,
            code = %response.code(),
            recipients = email.to.len(),
            subject = %email.subject,
            "Email sent successfully"
        );

        Ok(SentEmail { id: message_id })
    }
}
