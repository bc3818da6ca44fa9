//! Turns monitoring events into rendered outbox jobs.

use std::sync::Arc;

use certmon_common::status::days_remaining;
use certmon_common::types::{CertificateInfo, DomainStatus, NewOutboxJob, OutboxPriority, UserRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{NotifyError, Result};
use crate::format::{format_expiration_date, format_expires_in, settings_url};
use crate::template::{
    TemplateRenderer, CERTIFICATE_CHANGED_TEMPLATE, EXPIRING_TEMPLATE, HEARTBEAT_TEMPLATE,
};

/// Stored template names; the mailer turns them into provider tags.
pub const EXPIRING_TAG: &str = "Expiring";
pub const CERTIFICATE_CHANGED_TAG: &str = "CertificateChanged";
pub const HEARTBEAT_TAG: &str = "Heartbeat";

pub const HEARTBEAT_SUBJECT: &str = "Your certificate status report";

/// Presentation of an alerting status band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryMetadata {
    pub label: &'static str,
    pub class_name: &'static str,
    pub subject: &'static str,
}

pub fn expiry_metadata(status: DomainStatus) -> Option<ExpiryMetadata> {
    let (label, class_name, subject) = match status {
        DomainStatus::Expiring30Days => (
            "EXPIRING IN 30 DAYS",
            "warning",
            "Certificate expiring in 30 days",
        ),
        DomainStatus::Expiring14Days => (
            "EXPIRING IN 14 DAYS",
            "warning",
            "Certificate expiring in 14 days",
        ),
        DomainStatus::Expiring7Days => (
            "EXPIRING IN 7 DAYS",
            "critical",
            "Certificate expiring in 7 days",
        ),
        DomainStatus::Expiring1Day => (
            "EXPIRING IN 1 DAY",
            "critical",
            "Certificate expiring in 1 day",
        ),
        DomainStatus::Expired => ("EXPIRED", "critical", "Certificate expired"),
        DomainStatus::Pending | DomainStatus::Ok => return None,
    };
    Some(ExpiryMetadata {
        label,
        class_name,
        subject,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpiringEmailData<'a> {
    domain: &'a str,
    status_label: &'static str,
    status_class: &'static str,
    expires_in: String,
    expires_date: String,
    issuer: &'a str,
    settings_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CertificateChangedEmailData<'a> {
    domain: &'a str,
    old_fingerprint: &'a str,
    new_fingerprint: &'a str,
    issuer: &'a str,
    expires_in: String,
    expires_date: String,
    settings_url: String,
}

/// One domain line of the heartbeat digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDomain {
    pub domain: String,
    pub expires_in: String,
    pub expires_date: String,
    pub issuer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportError {
    pub domain: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportPending {
    pub domain: String,
}

/// Bucketed digest of a user's domains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatReport {
    pub generated_date: String,
    pub errors: Vec<ReportError>,
    pub pending: Vec<ReportPending>,
    pub critical: Vec<ReportDomain>,
    pub warning: Vec<ReportDomain>,
    pub healthy: Vec<ReportDomain>,
    pub total_domains: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatEmailData<'a> {
    #[serde(flatten)]
    report: &'a HeartbeatReport,
    settings_url: String,
}

/// Renders notifications for a given site and wraps them as outbox jobs.
#[derive(Clone)]
pub struct NotificationComposer {
    renderer: Arc<dyn TemplateRenderer>,
    website_url: String,
}

impl NotificationComposer {
    pub fn new(renderer: Arc<dyn TemplateRenderer>, website_url: impl Into<String>) -> Self {
        Self {
            renderer,
            website_url: website_url.into(),
        }
    }

    fn render<T: Serialize>(&self, template: &str, data: &T) -> Result<String> {
        let value = serde_json::to_value(data)?;
        self.renderer.render(template, &value)
    }

    /// Alert for a domain entering an expiring or expired band.
    pub fn expiring(
        &self,
        owner: &UserRecord,
        domain: &str,
        status: DomainStatus,
        cert: &CertificateInfo,
        now: DateTime<Utc>,
    ) -> Result<NewOutboxJob> {
        let metadata = expiry_metadata(status).ok_or_else(|| {
            NotifyError::TemplateError(format!("status {status} has no expiry notification"))
        })?;
        let data = ExpiringEmailData {
            domain,
            status_label: metadata.label,
            status_class: metadata.class_name,
            expires_in: format_expires_in(days_remaining(cert.not_after, now), status),
            expires_date: format_expiration_date(cert.not_after),
            issuer: cert.issuer.as_deref().unwrap_or("Unknown"),
            settings_url: settings_url(&self.website_url, &owner.settings_token),
        };
        Ok(NewOutboxJob {
            recipients: vec![owner.email.clone()],
            subject: format!("{}: {}", metadata.subject, domain),
            body: self.render(EXPIRING_TEMPLATE, &data)?,
            template_name: Some(EXPIRING_TAG.to_string()),
            priority: OutboxPriority::Medium,
            send_after: None,
        })
    }

    /// Alert for a domain now serving a different certificate.
    pub fn certificate_changed(
        &self,
        owner: &UserRecord,
        domain: &str,
        previous_fingerprint: &str,
        cert: &CertificateInfo,
        now: DateTime<Utc>,
    ) -> Result<NewOutboxJob> {
        let status = certmon_common::status::compute_status(cert.not_after, now);
        let data = CertificateChangedEmailData {
            domain,
            old_fingerprint: previous_fingerprint,
            new_fingerprint: cert.fingerprint.as_deref().unwrap_or("Unknown"),
            issuer: cert.issuer.as_deref().unwrap_or("Unknown"),
            expires_in: format_expires_in(days_remaining(cert.not_after, now), status),
            expires_date: format_expiration_date(cert.not_after),
            settings_url: settings_url(&self.website_url, &owner.settings_token),
        };
        Ok(NewOutboxJob {
            recipients: vec![owner.email.clone()],
            subject: format!("Certificate changed: {domain}"),
            body: self.render(CERTIFICATE_CHANGED_TEMPLATE, &data)?,
            template_name: Some(CERTIFICATE_CHANGED_TAG.to_string()),
            priority: OutboxPriority::High,
            send_after: None,
        })
    }

    pub fn heartbeat(&self, owner: &UserRecord, report: &HeartbeatReport) -> Result<NewOutboxJob> {
        let data = HeartbeatEmailData {
            report,
            settings_url: settings_url(&self.website_url, &owner.settings_token),
        };
        Ok(NewOutboxJob {
            recipients: vec![owner.email.clone()],
            subject: HEARTBEAT_SUBJECT.to_string(),
            body: self.render(HEARTBEAT_TEMPLATE, &data)?,
            template_name: Some(HEARTBEAT_TAG.to_string()),
            priority: OutboxPriority::Low,
            send_after: None,
        })
    }
}
