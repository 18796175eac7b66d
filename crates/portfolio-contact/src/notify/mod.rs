//! Email notifications for accepted submissions.
//!
//! Every accepted submission triggers two independent emails: an alert to the
//! site operator and an auto-reply to the visitor. Both are sent from a
//! background task; their outcomes are logged and never reach the HTTP caller.

pub mod smtp;
pub mod templates;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::config::EmailConfig;
use crate::error::{Error, Result};
use crate::submission::Submission;

pub use smtp::SmtpMailer;
pub use templates::{Rendered, TemplateContext};

/// Display name on operator alerts.
const ALERT_SENDER_NAME: &str = "Portfolio Contact Form";
/// Display name on test messages.
const TEST_SENDER_NAME: &str = "Portfolio Test";

/// Which template an email was rendered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    /// Alert to the site operator.
    OperatorAlert,
    /// Acknowledgement to the visitor.
    AutoReply,
    /// Manual configuration test.
    Test,
}

impl std::fmt::Display for EmailKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OperatorAlert => write!(f, "operator_alert"),
            Self::AutoReply => write!(f, "auto_reply"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// A fully addressed email ready for a [`Mailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// Template the content came from.
    pub kind: EmailKind,
    /// Display name for the `From` header; the address comes from the mailer.
    pub from_name: String,
    /// Recipient address.
    pub to: String,
    /// Optional `Reply-To` address.
    pub reply_to: Option<String>,
    /// Subject and bodies.
    pub content: Rendered,
}

/// Server acknowledgement of a delivered email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    /// SMTP reply code and first line.
    pub response: String,
}

/// Non-secret view of the mailer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailerStatus {
    /// Whether delivery is switched on.
    pub enabled: bool,
    /// Whether username and password are set.
    pub credentials_configured: bool,
    /// Whether the transport has been built.
    pub initialized: bool,
    /// SMTP host.
    pub host: String,
    /// SMTP port.
    pub port: u16,
    /// Implicit TLS.
    pub secure: bool,
    /// Whether a sender address resolves.
    pub sender_configured: bool,
    /// Whether an operator address resolves.
    pub operator_configured: bool,
}

/// Something that can deliver an [`OutgoingEmail`].
#[async_trait]
pub trait Mailer: Send + Sync + std::fmt::Debug {
    /// Deliver one email.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmailNotConfigured`] when delivery is unavailable, or
    /// a build/transport error otherwise.
    async fn deliver(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt>;

    /// Check that the mail server accepts a connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be built or reached.
    async fn verify(&self) -> Result<bool>;

    /// Current configuration status.
    fn status(&self) -> MailerStatus;
}

/// How one email of a dispatch ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Accepted by the server.
    Delivered(DeliveryReceipt),
    /// Not attempted because email is not configured.
    Skipped {
        /// Why.
        reason: String,
    },
    /// Attempted and failed.
    Failed {
        /// Error text.
        error: String,
    },
}

impl DeliveryOutcome {
    /// Whether the email was delivered.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// Outcomes of the two emails sent for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Submission the emails were about.
    pub submission_id: Option<i64>,
    /// Operator alert outcome.
    pub operator_alert: DeliveryOutcome,
    /// Auto-reply outcome.
    pub auto_reply: DeliveryOutcome,
}

/// Renders and sends submission emails through a [`Mailer`].
#[derive(Debug, Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    context: TemplateContext,
    tasks: TaskTracker,
}

impl Notifier {
    /// Create a notifier around an existing mailer.
    #[must_use]
    pub fn new(mailer: Arc<dyn Mailer>, context: TemplateContext) -> Self {
        Self {
            mailer,
            context,
            tasks: TaskTracker::new(),
        }
    }

    /// Create a notifier that sends through SMTP.
    #[must_use]
    pub fn from_config(config: &EmailConfig) -> Self {
        Self::new(
            Arc::new(SmtpMailer::new(config.clone())),
            TemplateContext::from_config(config),
        )
    }

    /// Build the operator alert for `submission`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmailNotConfigured`] if no operator address is set.
    pub fn operator_alert(&self, submission: &Submission) -> Result<OutgoingEmail> {
        let to = self
            .context
            .owner_address
            .clone()
            .ok_or_else(|| Error::email_not_configured("no operator address configured"))?;
        Ok(OutgoingEmail {
            kind: EmailKind::OperatorAlert,
            from_name: ALERT_SENDER_NAME.to_string(),
            to,
            reply_to: Some(submission.email.clone()),
            content: templates::operator_alert(submission, &self.context),
        })
    }

    /// Build the visitor auto-reply for `submission`.
    #[must_use]
    pub fn auto_reply(&self, submission: &Submission) -> OutgoingEmail {
        OutgoingEmail {
            kind: EmailKind::AutoReply,
            from_name: self.context.owner_name.clone(),
            to: submission.email.clone(),
            reply_to: None,
            content: templates::auto_reply(submission, &self.context),
        }
    }

    /// Send both emails for `submission` in the background.
    ///
    /// The two deliveries run concurrently and independently. The returned
    /// handle may be dropped; it exists so callers and tests can observe the
    /// outcome. Pending dispatches are awaited by [`Notifier::drain`].
    pub fn dispatch(&self, submission: Submission) -> JoinHandle<DispatchReport> {
        let notifier = self.clone();
        self.tasks.spawn(async move {
            let id = submission.id;
            let alert = notifier.operator_alert(&submission);
            let reply = notifier.auto_reply(&submission);

            let (operator_alert, auto_reply) = tokio::join!(
                notifier.deliver_logged(EmailKind::OperatorAlert, alert, id),
                notifier.deliver_logged(EmailKind::AutoReply, Ok(reply), id),
            );

            DispatchReport {
                submission_id: id,
                operator_alert,
                auto_reply,
            }
        })
    }

    /// Wait for in-flight dispatches to finish, for at most `timeout`.
    ///
    /// Returns `false` if deliveries were still running when time ran out.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tasks.close();
        let pending = self.tasks.len();
        if pending > 0 {
            info!(pending, "Waiting for email deliveries to finish");
        }
        tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok()
    }

    async fn deliver_logged(
        &self,
        kind: EmailKind,
        email: Result<OutgoingEmail>,
        submission_id: Option<i64>,
    ) -> DeliveryOutcome {
        let result = match email {
            Ok(email) => self.mailer.deliver(&email).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(receipt) => {
                info!(
                    submission_id,
                    kind = %kind,
                    response = %receipt.response,
                    "Email sent"
                );
                DeliveryOutcome::Delivered(receipt)
            }
            Err(e) if e.is_email_not_configured() => {
                warn!(submission_id, kind = %kind, "Email skipped: {}", e);
                DeliveryOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                error!(submission_id, kind = %kind, "Email delivery failed: {}", e);
                DeliveryOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Send the configuration test email to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailer is not configured or delivery fails.
    pub async fn send_test(&self, to: &str) -> Result<DeliveryReceipt> {
        let email = OutgoingEmail {
            kind: EmailKind::Test,
            from_name: TEST_SENDER_NAME.to_string(),
            to: to.to_string(),
            reply_to: None,
            content: templates::test_message(Utc::now(), &self.context),
        };
        let receipt = self.mailer.deliver(&email).await?;
        info!(to, response = %receipt.response, "Test email sent");
        Ok(receipt)
    }

    /// Check the mail server connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailer is not configured or unreachable.
    pub async fn verify(&self) -> Result<bool> {
        self.mailer.verify().await
    }

    /// Current mailer status.
    #[must_use]
    pub fn status(&self) -> MailerStatus {
        self.mailer.status()
    }
}
