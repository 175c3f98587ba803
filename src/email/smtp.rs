use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info};

use super::{DeliveryError, EmailSender, OutgoingEmail};
use crate::config::SmtpConfig;

const SMTPS_PORT: u16 = 465;

#[derive(Clone)]
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    pub fn new(cfg: &SmtpConfig) -> Result<Self, DeliveryError> {
        // 465 speaks TLS from the first byte, anything else upgrades with STARTTLS.
        let builder = if cfg.port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)?
        };
        let transport = builder
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        let from = Mailbox::new(Some(cfg.from_name.clone()), cfg.username.parse::<Address>()?);
        debug!(host = %cfg.host, port = cfg.port, "smtp transport configured");
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, email: OutgoingEmail) -> Result<(), DeliveryError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email.recipient.parse::<Mailbox>()?)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html_body)?;

        self.transport.send(message).await?;
        info!(recipient = %email.recipient, "email sent");
        Ok(())
    }
}
