#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use certmon_common::types::{CertificateInfo, NewDomain, NewUser, OutboxStatus};
use certmon_notify::{Mailer, NotifyError, OutgoingEmail};
use certmon_server::cert::prober::{CertificateSource, ProbeError};
use certmon_server::config::ServerConfig;
use certmon_server::worker::Worker;
use certmon_storage::{CertStore, OutboxFilter};
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

pub async fn setup_store() -> (TempDir, Arc<CertStore>) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("certmon.db").display());
    let store = CertStore::new(&url, 2).await.unwrap();
    (dir, Arc::new(store))
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()
}

pub fn config(extra: &str) -> ServerConfig {
    ServerConfig::parse(extra).unwrap()
}

pub fn worker(
    config: ServerConfig,
    store: Arc<CertStore>,
    source: Arc<FakeSource>,
    mailer: Arc<dyn Mailer>,
) -> Worker {
    Worker::new(config, store, source, mailer).unwrap()
}

pub async fn add_user(store: &CertStore, email: &str, confirmed: bool, heartbeat: bool) -> String {
    store
        .insert_user(&NewUser {
            email: email.to_string(),
            confirmed,
            settings_token: format!("token-{email}"),
            send_heartbeat_report: heartbeat,
        })
        .await
        .unwrap()
        .id
}

pub async fn add_domain(store: &CertStore, user_id: &str, name: &str, confirmed: bool) -> String {
    store
        .insert_domain(&NewDomain {
            user_id: user_id.to_string(),
            name: name.to_string(),
            port: None,
            confirmed,
        })
        .await
        .unwrap()
        .id
}

pub fn cert(fingerprint: &str, not_after: DateTime<Utc>) -> CertificateInfo {
    CertificateInfo {
        not_before: not_after - chrono::Duration::days(90),
        not_after,
        issuer: Some("Example CA".to_string()),
        cn: Some("example.com".to_string()),
        san: vec!["example.com".to_string()],
        serial: Some("0F".to_string()),
        fingerprint: Some(fingerprint.to_string()),
        ip: Some("93.184.216.34".to_string()),
    }
}

pub async fn count_jobs(store: &CertStore, template: Option<&str>, status: Option<OutboxStatus>) -> u64 {
    store
        .count_outbox_jobs(&OutboxFilter {
            status,
            template_name: template.map(str::to_string),
        })
        .await
        .unwrap()
}

#[derive(Clone)]
pub enum FakeProbe {
    Cert(CertificateInfo),
    Error(ProbeError),
    Panic,
}

/// Certificate source answering from a per-host script.
#[derive(Default)]
pub struct FakeSource {
    answers: Mutex<HashMap<String, FakeProbe>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn set(&self, host: &str, answer: FakeProbe) {
        self.answers.lock().unwrap().insert(host.to_string(), answer);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CertificateSource for FakeSource {
    async fn probe(
        &self,
        hostname: &str,
        _port: u16,
        _timeout: Duration,
    ) -> Result<CertificateInfo, ProbeError> {
        self.calls.lock().unwrap().push(hostname.to_string());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let answer = self.answers.lock().unwrap().get(hostname).cloned();
        match answer {
            Some(FakeProbe::Cert(cert)) => Ok(cert),
            Some(FakeProbe::Error(e)) => Err(e),
            Some(FakeProbe::Panic) => panic!("probe exploded for {hostname}"),
            None => Err(ProbeError::DnsFailure(format!("no answer scripted for {hostname}"))),
        }
    }
}

/// Mailer that keeps every message it is asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    /// Recipients whose messages are rejected.
    reject: Mutex<Vec<String>>,
}

impl RecordingMailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject(&self, recipient: &str) {
        self.reject.lock().unwrap().push(recipient.to_string());
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> certmon_notify::Result<()> {
        let rejected = self
            .reject
            .lock()
            .unwrap()
            .iter()
            .any(|r| email.recipients.contains(r));
        if rejected {
            return Err(NotifyError::SmtpError("550 mailbox unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }

    fn transport_name(&self) -> &str {
        "recording"
    }
}
