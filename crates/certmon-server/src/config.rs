use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub checks: ChecksConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
    #[serde(default)]
    pub mail: MailConfig,
    /// Base URL of the public site, used for settings links in emails.
    #[serde(default = "default_website_url")]
    pub website_url: String,
    /// Deployment environment; prefixes mail tags (`DEV-CERTS-...`).
    #[serde(default = "default_environment")]
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_checks_interval_secs")]
    pub interval_secs: u64,
    /// A domain is re-probed once its last check is older than this.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Probes in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub interval_secs: u64,
    /// Minimum time between two reports to the same user.
    #[serde(default = "default_heartbeat_period_secs")]
    pub period_secs: u64,
    /// How long an error must persist before it is reported.
    #[serde(default = "default_error_grace_secs")]
    pub error_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailProvider {
    Smtp,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_mail_provider")]
    pub provider: MailProvider,
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default = "default_mail_from")]
    pub from: String,
}

fn default_database_url() -> String {
    "sqlite://data/certmon.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_enabled() -> bool {
    true
}

fn default_checks_interval_secs() -> u64 {
    600
}

fn default_stale_after_secs() -> u64 {
    6 * 60 * 60
}

fn default_concurrency() -> usize {
    3
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_heartbeat_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_heartbeat_period_secs() -> u64 {
    14 * 24 * 60 * 60
}

fn default_error_grace_secs() -> u64 {
    24 * 60 * 60
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_batch_size() -> u64 {
    10
}

fn default_max_attempts() -> i32 {
    15
}

fn default_initial_delay_secs() -> u64 {
    10
}

fn default_base_delay_secs() -> u64 {
    1
}

fn default_max_delay_secs() -> u64 {
    20 * 60
}

fn default_mail_provider() -> MailProvider {
    MailProvider::Log
}

fn default_smtp_port() -> u16 {
    587
}

fn default_mail_from() -> String {
    "certmon <support@certs.email>".to_string()
}

fn default_website_url() -> String {
    "http://localhost:5173".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_checks_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
            concurrency: default_concurrency(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_heartbeat_interval_secs(),
            period_secs: default_heartbeat_period_secs(),
            error_grace_secs: default_error_grace_secs(),
        }
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            initial_delay_secs: default_initial_delay_secs(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            provider: default_mail_provider(),
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from: default_mail_from(),
        }
    }
}

impl ChecksConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl OutboxConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{path}'"))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file '{path}'"))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.checks.concurrency == 0 {
            anyhow::bail!("checks.concurrency must be at least 1");
        }
        if self.outbox.batch_size == 0 {
            anyhow::bail!("outbox.batch_size must be at least 1");
        }
        if self.outbox.max_attempts < 1 {
            anyhow::bail!("outbox.max_attempts must be at least 1");
        }
        if self.mail.provider == MailProvider::Smtp && self.mail.smtp_host.is_none() {
            anyhow::bail!("mail.smtp_host is required when mail.provider = \"smtp\"");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = ServerConfig::parse("").unwrap();
        assert_eq!(config.database.url, "sqlite://data/certmon.db?mode=rwc");
        assert_eq!(config.database.max_connections, 5);
        assert!(config.checks.enabled);
        assert_eq!(config.checks.interval_secs, 600);
        assert_eq!(config.checks.stale_after_secs, 21_600);
        assert_eq!(config.checks.concurrency, 3);
        assert_eq!(config.checks.probe_timeout(), Duration::from_secs(10));
        assert_eq!(config.heartbeat.interval_secs, 86_400);
        assert_eq!(config.heartbeat.period_secs, 1_209_600);
        assert_eq!(config.heartbeat.error_grace_secs, 86_400);
        assert_eq!(config.outbox.poll_interval_secs, 10);
        assert_eq!(config.outbox.batch_size, 10);
        assert_eq!(config.outbox.max_attempts, 15);
        assert_eq!(config.outbox.initial_delay_secs, 10);
        assert_eq!(config.outbox.base_delay_secs, 1);
        assert_eq!(config.outbox.max_delay_secs, 1200);
        assert_eq!(config.mail.provider, MailProvider::Log);
        assert_eq!(config.mail.smtp_port, 587);
        assert_eq!(config.website_url, "http://localhost:5173");
        assert_eq!(config.environment, "dev");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = ServerConfig::parse(
            r#"
            environment = "prod"

            [checks]
            concurrency = 8

            [mail]
            provider = "smtp"
            smtp_host = "smtp.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.environment, "prod");
        assert_eq!(config.checks.concurrency, 8);
        assert_eq!(config.checks.interval_secs, 600);
        assert_eq!(config.mail.provider, MailProvider::Smtp);
        assert_eq!(config.mail.smtp_host.as_deref(), Some("smtp.example.com"));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(ServerConfig::parse("[checks]\nconcurrency = 0").is_err());
        assert!(ServerConfig::parse("[mail]\nprovider = \"smtp\"").is_err());
        assert!(ServerConfig::parse("[mail]\nprovider = \"carrier-pigeon\"").is_err());
    }
}
