//! SMTP delivery through `lettre`.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info, warn};

use super::{DeliveryReceipt, Mailer, MailerStatus, OutgoingEmail};
use crate::config::EmailConfig;
use crate::error::{Error, Result};

/// Value of the `User-Agent` header on outgoing mail.
const MAILER_USER_AGENT: &str = "Portfolio Contact Form";

type Transport = AsyncSmtpTransport<Tokio1Executor>;

/// Mailer backed by an authenticated SMTP relay.
///
/// The transport is built on first use. While credentials are missing every
/// call fails with [`Error::EmailNotConfigured`] and initialisation is retried
/// on the next call.
pub struct SmtpMailer {
    config: EmailConfig,
    transport: Mutex<Option<Arc<Transport>>>,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl SmtpMailer {
    /// Create a mailer. No connection is made until the first delivery.
    #[must_use]
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            transport: Mutex::new(None),
        }
    }

    fn is_initialized(&self) -> bool {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn transport(&self) -> Result<Arc<Transport>> {
        if !self.config.enabled {
            return Err(Error::email_not_configured("email delivery is disabled"));
        }

        let mut slot = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(transport) = slot.as_ref() {
            return Ok(Arc::clone(transport));
        }

        let (Some(username), Some(password)) = (
            self.config.username.as_deref().filter(|v| !v.trim().is_empty()),
            self.config.password.as_deref().filter(|v| !v.is_empty()),
        ) else {
            warn!("Email credentials not configured, email delivery is disabled");
            return Err(Error::email_not_configured(
                "email.username and email.password must be set",
            ));
        };

        debug!(
            host = %self.config.host,
            port = self.config.port,
            secure = self.config.secure,
            "Initializing SMTP transport"
        );
        let builder = if self.config.secure {
            Transport::relay(&self.config.host)?
        } else {
            Transport::starttls_relay(&self.config.host)?
        };
        let transport = Arc::new(
            builder
                .port(self.config.port)
                .credentials(Credentials::new(
                    username.to_string(),
                    password.to_string(),
                ))
                .timeout(Some(self.config.timeout()))
                .build(),
        );

        info!("Email transport initialized for {}:{}", self.config.host, self.config.port);
        *slot = Some(Arc::clone(&transport));
        Ok(transport)
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message> {
        let sender = self
            .config
            .sender()
            .ok_or_else(|| Error::email_not_configured("no sender address configured"))?;

        let mut builder = Message::builder()
            .from(Mailbox::new(
                Some(email.from_name.clone()),
                parse_address(sender)?,
            ))
            .to(Mailbox::new(None, parse_address(&email.to)?))
            .subject(email.content.subject.clone())
            .user_agent(MAILER_USER_AGENT.to_string());
        if let Some(reply_to) = &email.reply_to {
            builder = builder.reply_to(Mailbox::new(None, parse_address(reply_to)?));
        }

        let message = builder.multipart(MultiPart::alternative_plain_html(
            email.content.text.clone(),
            email.content.html.clone(),
        ))?;
        Ok(message)
    }
}

fn parse_address(raw: &str) -> Result<Address> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| Error::email_address(raw, e.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt> {
        let transport = self.transport()?;
        let message = self.build_message(email)?;

        let response = transport.send(message).await?;
        Ok(DeliveryReceipt {
            response: format!(
                "{} {}",
                response.code(),
                response.first_line().unwrap_or_default()
            )
            .trim_end()
            .to_string(),
        })
    }

    async fn verify(&self) -> Result<bool> {
        let transport = self.transport()?;
        let ok = transport.test_connection().await?;
        if ok {
            info!("Email server connection verified");
        } else {
            warn!("Email server did not accept the connection test");
        }
        Ok(ok)
    }

    fn status(&self) -> MailerStatus {
        MailerStatus {
            enabled: self.config.enabled,
            credentials_configured: self.config.has_credentials(),
            initialized: self.is_initialized(),
            host: self.config.host.clone(),
            port: self.config.port,
            secure: self.config.secure,
            sender_configured: self.config.sender().is_some(),
            operator_configured: self.config.operator().is_some(),
        }
    }
}
