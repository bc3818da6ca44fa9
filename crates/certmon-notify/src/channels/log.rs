use async_trait::async_trait;

use crate::error::Result;
use crate::{Mailer, OutgoingEmail};

/// Transport that only writes the message to the log. Used in development.
#[derive(Debug, Default)]
pub struct LogMailer;

impl LogMailer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        tracing::info!(
            recipients = %email.recipients.join(", "),
            subject = %email.subject,
            tag = email.tag.as_deref().unwrap_or("-"),
            body_len = email.html.len(),
            "Email (log transport)"
        );
        Ok(())
    }

    fn transport_name(&self) -> &str {
        "log"
    }
}
