use std::sync::Arc;

use anyhow::{Context, Result};
use certmon_common::status::days_remaining;
use certmon_common::types::{DomainRecord, DomainStatus, UserRecord};
use certmon_notify::compose::{
    HeartbeatReport, NotificationComposer, ReportDomain, ReportError, ReportPending,
};
use certmon_notify::format::{format_expiration_date, format_expires_in, format_generated_date};
use certmon_storage::CertStore;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy)]
pub struct HeartbeatSettings {
    /// Minimum time between two reports to the same user.
    pub period: Duration,
    /// Errors younger than this are not reported yet.
    pub error_grace: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatSummary {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Builds the bucketed digest for one user's domains.
///
/// A domain whose error has lasted at least `error_grace` is listed only
/// under errors. Other domains are placed by status; domains without a
/// known expiry are left out of the expiry buckets.
pub fn build_report(domains: &[DomainRecord], now: DateTime<Utc>, error_grace: Duration) -> HeartbeatReport {
    let error_cutoff = now - error_grace;
    let mut report = HeartbeatReport {
        generated_date: format_generated_date(now),
        total_domains: domains.len(),
        ..Default::default()
    };

    for domain in domains {
        if let (Some(error), Some(started)) = (&domain.error, domain.error_started_at) {
            if started <= error_cutoff {
                report.errors.push(ReportError {
                    domain: domain.name.clone(),
                    error: error.clone(),
                });
                continue;
            }
        }

        if domain.status == DomainStatus::Pending {
            report.pending.push(ReportPending {
                domain: domain.name.clone(),
            });
            continue;
        }

        let Some(not_after) = domain.not_after else {
            continue;
        };
        let line = ReportDomain {
            domain: domain.name.clone(),
            expires_in: format_expires_in(days_remaining(not_after, now), domain.status),
            expires_date: format_expiration_date(not_after),
            issuer: domain.issuer.clone(),
        };
        if domain.status.is_critical() {
            report.critical.push(line);
        } else if domain.status.is_warning() {
            report.warning.push(line);
        } else {
            report.healthy.push(line);
        }
    }
    report
}

/// Sends each opted-in user a periodic summary of all their domains.
pub struct HeartbeatAggregator {
    store: Arc<CertStore>,
    composer: NotificationComposer,
    settings: HeartbeatSettings,
}

impl HeartbeatAggregator {
    pub fn new(store: Arc<CertStore>, composer: NotificationComposer, settings: HeartbeatSettings) -> Self {
        Self {
            store,
            composer,
            settings,
        }
    }

    pub async fn run_heartbeat(&self) -> Result<HeartbeatSummary> {
        self.run_heartbeat_at(Utc::now()).await
    }

    pub async fn run_heartbeat_at(&self, now: DateTime<Utc>) -> Result<HeartbeatSummary> {
        let candidates = self
            .store
            .list_heartbeat_candidates()
            .await
            .context("Failed to load heartbeat recipients")?;

        let mut summary = HeartbeatSummary::default();
        for (user, domains) in &candidates {
            if self.recently_sent(user, now) {
                summary.skipped += 1;
                continue;
            }
            match self.send_report(user, domains, now).await {
                Ok(()) => summary.sent += 1,
                Err(e) => {
                    tracing::error!(user_id = %user.id, error = %format!("{e:#}"), "Failed to queue heartbeat report");
                    summary.failed += 1;
                }
            }
        }
        tracing::info!(sent = summary.sent, skipped = summary.skipped, "Heartbeat reports queued");
        Ok(summary)
    }

    fn recently_sent(&self, user: &UserRecord, now: DateTime<Utc>) -> bool {
        user.last_heartbeat_sent_at
            .is_some_and(|sent| now - sent < self.settings.period)
    }

    async fn send_report(&self, user: &UserRecord, domains: &[DomainRecord], now: DateTime<Utc>) -> Result<()> {
        let report = build_report(domains, now, self.settings.error_grace);
        let job = self
            .composer
            .heartbeat(user, &report)
            .context("Failed to compose heartbeat report")?;
        self.store.enqueue_job(&job).await?;
        self.store.update_last_heartbeat_sent_at(&user.id, now).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap()
    }

    fn domain(name: &str, status: DomainStatus, expires_in_days: Option<i64>) -> DomainRecord {
        DomainRecord {
            id: name.to_string(),
            user_id: "u1".to_string(),
            name: name.to_string(),
            port: 443,
            confirmed: true,
            status,
            last_checked_at: None,
            not_before: None,
            not_after: expires_in_days.map(|d| now() + Duration::days(d)),
            issuer: Some("Let's Encrypt".to_string()),
            cn: None,
            san: Vec::new(),
            serial: None,
            fingerprint: None,
            ip: None,
            error: None,
            error_started_at: None,
            last_notified_at: None,
            last_cert_change_notified_at: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn failing(mut d: DomainRecord, since: Duration) -> DomainRecord {
        d.error = Some("TLS connection timed out".to_string());
        d.error_started_at = Some(now() - since);
        d
    }

    #[test]
    fn domains_land_in_status_buckets() {
        let domains = vec![
            domain("ok.test", DomainStatus::Ok, Some(80)),
            domain("soon.test", DomainStatus::Expiring14Days, Some(10)),
            domain("late.test", DomainStatus::Expired, Some(-3)),
            domain("new.test", DomainStatus::Pending, None),
        ];
        let report = build_report(&domains, now(), Duration::hours(24));

        assert_eq!(report.generated_date, "2026-05-04");
        assert_eq!(report.total_domains, 4);
        assert_eq!(report.healthy.len(), 1);
        assert_eq!(report.healthy[0].expires_in, "in 80 days");
        assert_eq!(report.warning[0].domain, "soon.test");
        assert_eq!(report.critical[0].expires_in, "expired 3 days ago");
        assert_eq!(report.pending[0].domain, "new.test");
        assert!(report.errors.is_empty());
    }

    #[test]
    fn errors_are_reported_only_after_grace() {
        let domains = vec![
            failing(domain("old-error.test", DomainStatus::Ok, Some(60)), Duration::hours(30)),
            failing(domain("fresh-error.test", DomainStatus::Ok, Some(60)), Duration::hours(2)),
        ];
        let report = build_report(&domains, now(), Duration::hours(24));

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].domain, "old-error.test");
        assert_eq!(report.errors[0].error, "TLS connection timed out");
        assert_eq!(report.healthy.len(), 1);
        assert_eq!(report.healthy[0].domain, "fresh-error.test");
    }

    #[test]
    fn never_checked_failing_domain_stays_pending_during_grace() {
        let domains = vec![failing(domain("dns.test", DomainStatus::Pending, None), Duration::minutes(5))];
        let report = build_report(&domains, now(), Duration::hours(24));
        assert_eq!(report.pending.len(), 1);
        assert!(report.errors.is_empty());
    }
}
