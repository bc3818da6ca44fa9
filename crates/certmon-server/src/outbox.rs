use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use certmon_common::types::{NewOutboxJob, OutboxJob};
use certmon_notify::{Mailer, OutgoingEmail};
use certmon_storage::CertStore;
use chrono::{DateTime, Utc};

use crate::config::OutboxConfig;

/// Retry policy and batch size of the outbox drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboxSettings {
    pub batch_size: u64,
    /// A job is marked failed once it has failed this many times.
    pub max_attempts: i32,
    pub initial_delay: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl From<&OutboxConfig> for OutboxSettings {
    fn from(config: &OutboxConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_secs(config.initial_delay_secs),
            base_delay: Duration::from_secs(config.base_delay_secs),
            max_delay: Duration::from_secs(config.max_delay_secs),
        }
    }
}

/// Delay before the next attempt of a job that has already failed
/// `failed_attempts` times:
/// `initial + min(2^failed_attempts * base, max)`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use certmon_server::outbox::{retry_delay, OutboxSettings};
///
/// let settings = OutboxSettings {
///     batch_size: 10,
///     max_attempts: 15,
///     initial_delay: Duration::from_secs(10),
///     base_delay: Duration::from_secs(1),
///     max_delay: Duration::from_secs(1200),
/// };
/// assert_eq!(retry_delay(&settings, 0), Duration::from_secs(11));
/// assert_eq!(retry_delay(&settings, 3), Duration::from_secs(18));
/// assert_eq!(retry_delay(&settings, 20), Duration::from_secs(1210));
/// ```
pub fn retry_delay(settings: &OutboxSettings, failed_attempts: i32) -> Duration {
    let exponent = failed_attempts.clamp(0, 31) as u32;
    let backoff = settings
        .base_delay
        .saturating_mul(2u32.saturating_pow(exponent))
        .min(settings.max_delay);
    settings.initial_delay.saturating_add(backoff)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
    /// Jobs whose delivery state could not be recorded.
    pub write_errors: usize,
}

enum DeliveryResult {
    Sent,
    Retrying,
    GaveUp,
}

/// Durable queue of outgoing email, drained by a polling loop.
pub struct NotificationOutbox {
    store: Arc<CertStore>,
    mailer: Arc<dyn Mailer>,
    environment: String,
    settings: OutboxSettings,
}

impl NotificationOutbox {
    pub fn new(
        store: Arc<CertStore>,
        mailer: Arc<dyn Mailer>,
        environment: impl Into<String>,
        settings: OutboxSettings,
    ) -> Self {
        Self {
            store,
            mailer,
            environment: environment.into(),
            settings,
        }
    }

    pub async fn enqueue(&self, job: &NewOutboxJob) -> Result<String> {
        let id = self
            .store
            .enqueue_job(job)
            .await
            .context("Failed to enqueue email")?;
        tracing::debug!(id = %id, subject = %job.subject, priority = ?job.priority, "Email queued");
        Ok(id)
    }

    pub async fn drain(&self) -> Result<DrainSummary> {
        self.drain_at(Utc::now()).await
    }

    /// Sends up to one batch of due jobs, most urgent first, one at a time.
    pub async fn drain_at(&self, now: DateTime<Utc>) -> Result<DrainSummary> {
        let jobs = self
            .store
            .fetch_due_jobs(now, self.settings.batch_size)
            .await
            .context("Failed to fetch due emails")?;

        let mut summary = DrainSummary::default();
        if jobs.is_empty() {
            return Ok(summary);
        }
        tracing::info!("Processing {} queued emails", jobs.len());

        for job in &jobs {
            tracing::info!(transport = self.mailer.transport_name(), "Sending email {}", job.id);
            let email = OutgoingEmail::from_job(job, &self.environment);
            let recorded = match self.mailer.send(&email).await {
                Ok(()) => self
                    .store
                    .mark_job_completed(&job.id, now)
                    .await
                    .with_context(|| format!("Failed to mark email {} completed", job.id))
                    .map(|()| DeliveryResult::Sent),
                Err(e) => self.handle_failure(job, now, &e.to_string()).await,
            };
            match recorded {
                Ok(DeliveryResult::Sent) => summary.sent += 1,
                Ok(DeliveryResult::Retrying) => summary.retried += 1,
                Ok(DeliveryResult::GaveUp) => summary.failed += 1,
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %format!("{e:#}"), "Failed to record email delivery state");
                    summary.write_errors += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn handle_failure(&self, job: &OutboxJob, now: DateTime<Utc>, error: &str) -> Result<DeliveryResult> {
        let attempts = job.failed_attempts.saturating_add(1);
        if attempts >= self.settings.max_attempts {
            tracing::error!(error = %error, attempts, "Email {} failed permanently", job.id);
            self.store
                .mark_job_failed(&job.id, attempts)
                .await
                .with_context(|| format!("Failed to mark email {} failed", job.id))?;
            return Ok(DeliveryResult::GaveUp);
        }

        let delay = retry_delay(&self.settings, job.failed_attempts);
        let retry_after =
            now + chrono::Duration::from_std(delay).context("Retry delay out of range")?;
        tracing::warn!(
            error = %error,
            attempts,
            "Email {} failed; retrying in {} seconds",
            job.id,
            delay.as_secs()
        );
        self.store
            .schedule_job_retry(&job.id, attempts, retry_after)
            .await
            .with_context(|| format!("Failed to reschedule email {}", job.id))?;
        Ok(DeliveryResult::Retrying)
    }
}
