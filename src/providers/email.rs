use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::DispatchError;
use crate::providers::{ProviderAdapter, SendOutcome, SendRequest};

/// SMTP email sender bound to the environment-level mail configuration.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_mailbox: Mailbox,
}

impl SmtpMailer {
    pub fn from_env(config: &Config) -> Result<Self, DispatchError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| DispatchError::config("SMTP_HOST is not configured"))?;
        let from = config
            .smtp_from
            .as_deref()
            .ok_or_else(|| DispatchError::config("SMTP_FROM is not configured"))?;

        let from_mailbox = from
            .parse::<Mailbox>()
            .map_err(|e| DispatchError::config(format!("Invalid SMTP_FROM address: {}", e)))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| DispatchError::config(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        info!(host, "SMTP mailer initialized");

        Ok(Self {
            transport: builder.build(),
            from_mailbox,
        })
    }
}

#[async_trait]
impl ProviderAdapter for SmtpMailer {
    async fn send(&self, request: &SendRequest) -> Result<SendOutcome, DispatchError> {
        let to_mailbox = match request.recipient.parse::<Mailbox>() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                return Ok(SendOutcome::failed(
                    self.provider(),
                    format!("Invalid recipient address: {}", e),
                ));
            }
        };

        let content_type = if request.content.contains("<html>") || request.content.contains("<p>")
        {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };

        let message = match Message::builder()
            .from(self.from_mailbox.clone())
            .to(to_mailbox)
            .subject(&request.title)
            .header(content_type)
            .body(request.content.clone())
        {
            Ok(message) => message,
            Err(e) => {
                return Ok(SendOutcome::failed(
                    self.provider(),
                    format!("Failed to build email message: {}", e),
                ));
            }
        };

        debug!(recipient = %request.recipient, "Sending email via SMTP");

        match self.transport.send(message).await {
            Ok(response) => {
                let mut outcome = SendOutcome::sent(self.provider());
                if let Some(line) = response.message().next() {
                    outcome = outcome.with_message_id(line.to_string());
                }
                Ok(outcome)
            }
            Err(e) => Ok(SendOutcome::failed(self.provider(), e.to_string())),
        }
    }

    fn provider(&self) -> &'static str {
        "smtp"
    }
}
