use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use certmon_common::status::{compute_status, days_remaining};
use certmon_common::types::{CertificateInfo, CheckOutcome, DomainRecord, DueDomain};
use certmon_notify::compose::NotificationComposer;
use certmon_storage::{CertStore, DomainSnapshotUpdate};
use chrono::{DateTime, Utc};
use futures::future::join_all;

use super::prober::CertificateSource;

/// Recorded when a probe fails in a way the prober could not classify.
pub const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Debug, Clone)]
pub struct CheckSettings {
    /// Domains last checked longer ago than this are due again.
    pub stale_after: chrono::Duration,
    /// Probes in flight at once; a chunk finishes before the next starts.
    pub concurrency: usize,
    pub probe_timeout: Duration,
}

/// Totals for one check cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub notifications_queued: usize,
    /// Domains whose outcome could not be persisted; they stay due.
    pub write_errors: usize,
}

enum DomainOutcome {
    Succeeded { queued: usize },
    Failed,
    WriteError,
}

/// Probes due domains and persists what it finds.
pub struct DomainCheckRunner {
    store: Arc<CertStore>,
    prober: Arc<dyn CertificateSource>,
    composer: NotificationComposer,
    settings: CheckSettings,
}

impl DomainCheckRunner {
    pub fn new(
        store: Arc<CertStore>,
        prober: Arc<dyn CertificateSource>,
        composer: NotificationComposer,
        settings: CheckSettings,
    ) -> Self {
        Self {
            store,
            prober,
            composer,
            settings,
        }
    }

    pub async fn run_checks(&self) -> Result<CheckSummary> {
        self.run_checks_at(Utc::now()).await
    }

    /// One check cycle evaluated at `now`.
    pub async fn run_checks_at(&self, now: DateTime<Utc>) -> Result<CheckSummary> {
        let stale_before = now - self.settings.stale_after;
        let due = self
            .store
            .query_domains_due_for_check(stale_before)
            .await
            .context("Failed to select domains due for check")?;

        tracing::info!(count = due.len(), "Found domains to process");

        let mut summary = CheckSummary {
            due: due.len(),
            ..Default::default()
        };
        for chunk in due.chunks(self.settings.concurrency.max(1)) {
            let outcomes = join_all(chunk.iter().map(|d| self.check_domain(d, now))).await;
            for outcome in outcomes {
                match outcome {
                    DomainOutcome::Succeeded { queued } => {
                        summary.succeeded += 1;
                        summary.notifications_queued += queued;
                    }
                    DomainOutcome::Failed => summary.failed += 1,
                    DomainOutcome::WriteError => summary.write_errors += 1,
                }
            }
        }
        Ok(summary)
    }

    async fn check_domain(&self, due: &DueDomain, now: DateTime<Utc>) -> DomainOutcome {
        let domain = &due.domain;
        match self.probe_isolated(domain).await {
            Err(message) => match self.record_failure(domain, now, &message).await {
                Ok(()) => DomainOutcome::Failed,
                Err(e) => {
                    tracing::error!(domain = %domain.name, error = %format!("{e:#}"), "Failed to record check failure");
                    DomainOutcome::WriteError
                }
            },
            Ok(cert) => match self.record_success(due, cert, now).await {
                Ok(queued) => DomainOutcome::Succeeded { queued },
                Err(e) => {
                    tracing::error!(domain = %domain.name, error = %format!("{e:#}"), "Failed to record check result");
                    DomainOutcome::WriteError
                }
            },
        }
    }

    /// Runs the probe on its own task so a panic inside it only affects
    /// this domain.
    async fn probe_isolated(&self, domain: &DomainRecord) -> std::result::Result<CertificateInfo, String> {
        let prober = self.prober.clone();
        let hostname = domain.name.clone();
        let port = domain.port;
        let timeout = self.settings.probe_timeout;

        match tokio::spawn(async move { prober.probe(&hostname, port, timeout).await }).await {
            Ok(Ok(cert)) => Ok(cert),
            Ok(Err(e)) => {
                tracing::warn!(
                    domain = %domain.name,
                    error = %e,
                    detail = e.detail().unwrap_or(""),
                    "Check failed"
                );
                Err(e.to_string())
            }
            Err(e) => {
                tracing::error!(
                    domain = %domain.name,
                    error = %e,
                    "Unknown error while fetching certificate, continuing"
                );
                Err(UNKNOWN_ERROR.to_string())
            }
        }
    }

    async fn record_failure(&self, domain: &DomainRecord, now: DateTime<Utc>, message: &str) -> Result<()> {
        let error_started_at = domain.error_started_at.unwrap_or(now);
        let tx = self.store.begin().await?;
        tx.insert_check(&domain.id, now, &CheckOutcome::Failure(message.to_string()))
            .await?;
        tx.record_domain_failure(&domain.id, now, message, error_started_at)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Persists a successful probe and queues the notifications it triggers,
    /// all in one transaction. Returns the number of queued notifications.
    async fn record_success(
        &self,
        due: &DueDomain,
        cert: CertificateInfo,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let domain = &due.domain;
        let next_status = compute_status(cert.not_after, now);
        let previous_fingerprint = domain.fingerprint.as_deref();
        let cert_changed = previous_fingerprint.is_some()
            && previous_fingerprint != cert.fingerprint.as_deref();
        let should_notify = next_status != domain.status && next_status.is_notifiable();

        tracing::info!(domain = %domain.name, status = %next_status, "Certificate checked");

        let mut jobs = Vec::new();
        if let (true, Some(previous)) = (cert_changed, previous_fingerprint) {
            tracing::info!(domain = %domain.name, "Certificate changed, queueing notification");
            jobs.push(
                self.composer
                    .certificate_changed(&due.owner, &domain.name, previous, &cert, now)
                    .context("Failed to compose certificate change email")?,
            );
        }
        if should_notify {
            tracing::info!(
                domain = %domain.name,
                status = %next_status,
                days_remaining = days_remaining(cert.not_after, now),
                "Sending notification for new status"
            );
            jobs.push(
                self.composer
                    .expiring(&due.owner, &domain.name, next_status, &cert, now)
                    .context("Failed to compose expiry email")?,
            );
        }

        let update = DomainSnapshotUpdate {
            checked_at: now,
            status: next_status,
            certificate: cert.clone(),
            last_notified_at: should_notify.then_some(now),
            last_cert_change_notified_at: cert_changed.then_some(now),
        };

        let tx = self.store.begin().await?;
        tx.insert_check(&domain.id, now, &CheckOutcome::Success(cert))
            .await?;
        tx.record_domain_success(&domain.id, &update).await?;
        for job in &jobs {
            tx.enqueue_job(job).await?;
        }
        tx.commit().await?;
        Ok(jobs.len())
    }
}
