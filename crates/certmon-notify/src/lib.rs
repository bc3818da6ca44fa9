//! Outgoing mail for certificate notifications.
//!
//! Notifications are rendered to HTML up front (see [`compose`]) and stored
//! in the outbox; delivery later goes through a [`Mailer`]. Two transports
//! are built in: SMTP via lettre and a log-only transport for development.

pub mod channels;
pub mod compose;
pub mod error;
pub mod format;
pub mod template;


use async_trait::async_trait;
use certmon_common::types::OutboxJob;

pub use error::{NotifyError, Result};

/// A fully rendered email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub recipients: Vec<String>,
    pub subject: String,
    pub html: String,
    /// Provider-side category, e.g. `PROD-CERTS-Heartbeat`.
    pub tag: Option<String>,
}

impl OutgoingEmail {
    /// Builds the message for a queued job. The stored template name is
    /// turned into a tag prefixed with the deployment environment.
    pub fn from_job(job: &OutboxJob, environment: &str) -> Self {
        Self {
            recipients: job.recipients.clone(),
            subject: job.subject.clone(),
            html: job.body.clone(),
            tag: job
                .template_name
                .as_deref()
                .map(|name| format::message_tag(environment, name)),
        }
    }
}

/// A mail transport.
///
/// Implementations must be safe to share across the worker loops.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Delivers the message to all of its recipients.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejected the message. The caller
    /// owns retrying.
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;

    /// Returns the transport name (e.g., `"smtp"`, `"log"`).
    fn transport_name(&self) -> &str;
}
