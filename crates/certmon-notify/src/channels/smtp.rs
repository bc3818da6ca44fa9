use async_trait::async_trait;
use lettre::message::header::{ContentType, Header, HeaderName, HeaderValue};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::error::{NotifyError, Result};
use crate::{Mailer, OutgoingEmail};

/// `X-Message-Tag` header carrying the notification category.
#[derive(Debug, Clone)]
struct MessageTag(String);

impl Header for MessageTag {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Message-Tag")
    }

    fn parse(s: &str) -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse::<Mailbox>()
        .map_err(|e| NotifyError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Port that speaks TLS from the first byte (SMTPS).
pub const IMPLICIT_TLS_PORT: u16 = 465;

/// How the connection to the relay is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Plain SMTP upgraded with `STARTTLS` (submission, port 587).
    StartTls,
    /// TLS handshake before the SMTP greeting (port 465).
    ImplicitTls,
}

impl SmtpSecurity {
    pub fn for_port(port: u16) -> Self {
        if port == IMPLICIT_TLS_PORT {
            SmtpSecurity::ImplicitTls
        } else {
            SmtpSecurity::StartTls
        }
    }
}

/// Delivers mail through an SMTP relay. Port 465 uses implicit TLS, every
/// other port a mandatory `STARTTLS` upgrade.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    security: SmtpSecurity,
}

impl SmtpMailer {
    pub fn new(
        smtp_host: &str,
        smtp_port: u16,
        username: Option<&str>,
        password: Option<&str>,
        from: &str,
    ) -> Result<Self> {
        if smtp_host.trim().is_empty() {
            return Err(NotifyError::InvalidConfig("missing smtp_host".to_string()));
        }
        let security = SmtpSecurity::for_port(smtp_port);
        let builder = match security {
            SmtpSecurity::ImplicitTls => AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host),
            SmtpSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host),
        };
        let mut builder = builder
            .map_err(|e| NotifyError::InvalidConfig(e.to_string()))?
            .port(smtp_port);

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }

        Ok(Self {
            transport: builder.build(),
            from: parse_mailbox(from)?,
            security,
        })
    }

    pub fn security(&self) -> SmtpSecurity {
        self.security
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message> {
        if email.recipients.is_empty() {
            return Err(NotifyError::MessageBuild("no recipients".to_string()));
        }
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML);
        for recipient in &email.recipients {
            builder = builder.to(parse_mailbox(recipient)?);
        }
        if let Some(ref tag) = email.tag {
            builder = builder.header(MessageTag(tag.clone()));
        }
        builder
            .body(email.html.clone())
            .map_err(|e| NotifyError::MessageBuild(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let message = self.build_message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::SmtpError(e.to_string()))?;
        tracing::debug!(
            recipients = email.recipients.len(),
            subject = %email.subject,
            "Email handed to SMTP relay"
        );
        Ok(())
    }

    fn transport_name(&self) -> &str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailer() -> SmtpMailer {
        SmtpMailer::new("smtp.example.com", 587, None, None, "certmon <support@certs.email>")
            .unwrap()
    }

    fn email(recipients: &[&str]) -> OutgoingEmail {
        OutgoingEmail {
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            subject: "Certificate expired: example.com".to_string(),
            html: "<p>expired</p>".to_string(),
            tag: Some("DEV-CERTS-Expiring".to_string()),
        }
    }

    #[test]
    fn message_carries_tag_header() {
        let message = mailer().build_message(&email(&["a@example.com"])).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("X-Message-Tag: DEV-CERTS-Expiring"));
        assert!(raw.contains("Subject: Certificate expired: example.com"));
    }

    #[test]
    fn rejects_bad_recipient_and_empty_list() {
        let err = mailer().build_message(&email(&["not an address"])).unwrap_err();
        assert!(matches!(err, NotifyError::InvalidAddress { .. }));

        let err = mailer().build_message(&email(&[])).unwrap_err();
        assert!(matches!(err, NotifyError::MessageBuild(_)));
    }

    #[test]
    fn submission_port_upgrades_with_starttls() {
        assert_eq!(mailer().security(), SmtpSecurity::StartTls);
        assert_eq!(SmtpSecurity::for_port(25), SmtpSecurity::StartTls);

        let smtps = SmtpMailer::new("smtp.example.com", 465, None, None, "a@example.com").unwrap();
        assert_eq!(smtps.security(), SmtpSecurity::ImplicitTls);
    }

    #[test]
    fn rejects_missing_host() {
        let err = SmtpMailer::new("", 587, None, None, "a@example.com").err().unwrap();
        assert!(matches!(err, NotifyError::InvalidConfig(_)));
    }
}
