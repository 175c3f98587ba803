use async_trait::async_trait;
use thiserror::Error;

mod smtp;
pub mod templates;

pub use smtp::SmtpEmailSender;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid mailbox address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp transport: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("outbound email is not configured")]
    Disabled,
}

/// Outbound mail seam. Delivery is attempted once; callers own the rollback.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), DeliveryError>;
}

/// Used when no SMTP relay is configured. Every send fails.
#[derive(Debug, Default, Clone)]
pub struct DisabledEmailSender;

#[async_trait]
impl EmailSender for DisabledEmailSender {
    async fn send(&self, email: OutgoingEmail) -> Result<(), DeliveryError> {
        tracing::warn!(recipient = %email.recipient, "email dropped: smtp not configured");
        Err(DeliveryError::Disabled)
    }
}
