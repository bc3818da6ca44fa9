use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use certmon_notify::channels::{LogMailer, SmtpMailer};
use certmon_notify::compose::NotificationComposer;
use certmon_notify::template::HandlebarsRenderer;
use certmon_notify::Mailer;
use certmon_storage::CertStore;
use tokio::task::JoinHandle;

use crate::cert::checks::{CheckSettings, DomainCheckRunner};
use crate::cert::prober::{CertificateSource, TlsProber};
use crate::cert::resolve::HickoryResolver;
use crate::config::{MailConfig, MailProvider, ServerConfig};
use crate::heartbeat::{HeartbeatAggregator, HeartbeatSettings};
use crate::outbox::{NotificationOutbox, OutboxSettings};
use crate::scheduler::{LoopScheduler, LoopTask};

pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    match config.provider {
        MailProvider::Log => Ok(Arc::new(LogMailer::new())),
        MailProvider::Smtp => {
            let host = config
                .smtp_host
                .as_deref()
                .context("mail.smtp_host is required for the smtp provider")?;
            let mailer = SmtpMailer::new(
                host,
                config.smtp_port,
                config.smtp_username.as_deref(),
                config.smtp_password.as_deref(),
                &config.from,
            )?;
            Ok(Arc::new(mailer))
        }
    }
}

#[async_trait]
impl LoopTask for DomainCheckRunner {
    async fn run(&self) -> Result<()> {
        let summary = self.run_checks().await?;
        tracing::debug!(?summary, "Check cycle summary");
        Ok(())
    }
}

#[async_trait]
impl LoopTask for HeartbeatAggregator {
    async fn run(&self) -> Result<()> {
        self.run_heartbeat().await.map(|_| ())
    }
}

#[async_trait]
impl LoopTask for NotificationOutbox {
    async fn run(&self) -> Result<()> {
        let summary = self.drain().await?;
        if summary != Default::default() {
            tracing::debug!(?summary, "Outbox drain summary");
        }
        Ok(())
    }
}

/// The three background loops and what they share.
pub struct Worker {
    config: ServerConfig,
    pub store: Arc<CertStore>,
    pub checks: Arc<DomainCheckRunner>,
    pub heartbeat: Arc<HeartbeatAggregator>,
    pub outbox: Arc<NotificationOutbox>,
}

impl Worker {
    /// Connects to the database and builds the production prober and mailer.
    pub async fn from_config(config: ServerConfig) -> Result<Self> {
        let store = Arc::new(
            CertStore::new(&config.database.url, config.database.max_connections)
                .await
                .context("Failed to open database")?,
        );
        let resolver = Arc::new(HickoryResolver::from_system_conf()?);
        let prober: Arc<dyn CertificateSource> = Arc::new(TlsProber::new(resolver)?);
        let mailer = build_mailer(&config.mail)?;
        tracing::info!(transport = mailer.transport_name(), "Mail transport ready");
        Self::new(config, store, prober, mailer)
    }

    pub fn new(
        config: ServerConfig,
        store: Arc<CertStore>,
        prober: Arc<dyn CertificateSource>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self> {
        let renderer = Arc::new(HandlebarsRenderer::new()?);
        let composer = NotificationComposer::new(renderer, config.website_url.clone());

        let checks = DomainCheckRunner::new(
            store.clone(),
            prober,
            composer.clone(),
            CheckSettings {
                stale_after: seconds(config.checks.stale_after_secs),
                concurrency: config.checks.concurrency,
                probe_timeout: config.checks.probe_timeout(),
            },
        );
        let heartbeat = HeartbeatAggregator::new(
            store.clone(),
            composer,
            HeartbeatSettings {
                period: seconds(config.heartbeat.period_secs),
                error_grace: seconds(config.heartbeat.error_grace_secs),
            },
        );
        let outbox = NotificationOutbox::new(
            store.clone(),
            mailer,
            config.environment.clone(),
            OutboxSettings::from(&config.outbox),
        );

        Ok(Self {
            config,
            store,
            checks: Arc::new(checks),
            heartbeat: Arc::new(heartbeat),
            outbox: Arc::new(outbox),
        })
    }

    /// Schedulers for every enabled loop, with their log hooks installed.
    pub fn schedulers(&self) -> Vec<LoopScheduler> {
        let mut loops = Vec::new();
        if self.config.checks.enabled {
            loops.push(
                LoopScheduler::new("checks", self.config.checks.interval(), self.checks.clone())
                    .on_start(|| tracing::info!("Starting domain checks run..."))
                    .on_finish(|took| tracing::info!(took_ms = took.as_millis() as u64, "Domain checks finished"))
                    .on_fail(|e| tracing::error!(error = %format!("{e:#}"), "Domain checks run failed")),
            );
        }
        if self.config.heartbeat.enabled {
            loops.push(
                LoopScheduler::new("heartbeat", self.config.heartbeat.interval(), self.heartbeat.clone())
                    .on_start(|| tracing::info!("Starting heartbeat report run..."))
                    .on_finish(|took| tracing::info!(took_ms = took.as_millis() as u64, "Heartbeat report finished"))
                    .on_fail(|e| tracing::error!(error = %format!("{e:#}"), "Heartbeat report run failed")),
            );
        }
        loops.push(
            LoopScheduler::new("outbox", self.config.outbox.poll_interval(), self.outbox.clone())
                .on_start(|| tracing::debug!("Checking email outbox..."))
                .on_finish(|took| tracing::debug!(took_ms = took.as_millis() as u64, "Email outbox poll finished"))
                .on_fail(|e| tracing::error!(error = %format!("{e:#}"), "Email outbox poll failed")),
        );
        loops
    }

    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        self.schedulers()
            .into_iter()
            .map(LoopScheduler::spawn)
            .collect()
    }
}

/// Config durations are clamped to a century.
const MAX_CONFIG_SECS: u64 = 100 * 365 * 24 * 60 * 60;

fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_CONFIG_SECS) as i64)
}
