//! Outbound transactional email.
//!
//! [`ResendMailer`] delivers through the Resend API when credentials are
//! configured; otherwise [`LogMailer`] records the message at `info` so local
//! development can follow reset links from the log. [`MemoryMailer`] keeps an
//! outbox for tests.

use async_trait::async_trait;
use resend_rs::Resend;
use resend_rs::types::CreateEmailBaseOptions;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("email delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

pub struct ResendMailer {
    client: Resend,
    from: String,
}

impl ResendMailer {
    #[must_use]
    pub fn new(api_key: &str, from: impl Into<String>) -> Self {
        Self { client: Resend::new(api_key), from: from.into() }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let to = [email.to.as_str()];
        let message = CreateEmailBaseOptions::new(&self.from, to, &email.subject).with_html(&email.html);
        self.client
            .emails
            .send(message)
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?;
        info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        info!(to = %email.to, subject = %email.subject, html = %email.html, "email delivery disabled; logging message");
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMailer {
    outbox: Mutex<Vec<OutgoingEmail>>,
    fail_with: Option<String>,
}

impl MemoryMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self { outbox: Mutex::new(Vec::new()), fail_with: Some(message.into()) }
    }

    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.outbox.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        if let Some(message) = &self.fail_with {
            return Err(MailError::Delivery(message.clone()));
        }
        self.outbox.lock().await.push(email);
        Ok(())
    }
}
