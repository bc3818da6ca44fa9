use certmon_common::types::{
    CertificateInfo, CheckOutcome, DomainStatus, NewDomain, NewOutboxJob, NewUser,
    OutboxPriority, OutboxStatus,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use crate::{CertStore, DomainSnapshotUpdate, OutboxFilter, StorageError};

async fn setup() -> (TempDir, CertStore) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("certmon.db").display());
    let store = CertStore::new(&url, 2).await.unwrap();
    (dir, store)
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 8, 30, 0).unwrap()
}

async fn add_user(store: &CertStore, email: &str, confirmed: bool) -> String {
    store
        .insert_user(&NewUser {
            email: email.to_string(),
            confirmed,
            settings_token: format!("token-{email}"),
            send_heartbeat_report: true,
        })
        .await
        .unwrap()
        .id
}

async fn add_domain(store: &CertStore, user_id: &str, name: &str, confirmed: bool) -> String {
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

fn cert(fingerprint: &str) -> CertificateInfo {
    CertificateInfo {
        not_before: now() - Duration::days(60),
        not_after: now() + Duration::days(30),
        issuer: Some("Let's Encrypt".to_string()),
        cn: Some("example.com".to_string()),
        san: vec!["example.com".to_string(), "www.example.com".to_string()],
        serial: Some("03A1".to_string()),
        fingerprint: Some(fingerprint.to_string()),
        ip: Some("93.184.216.34".to_string()),
    }
}

fn job(subject: &str, priority: OutboxPriority) -> NewOutboxJob {
    NewOutboxJob {
        recipients: vec!["owner@example.com".to_string()],
        subject: subject.to_string(),
        body: "<p>hello</p>".to_string(),
        template_name: Some("Expiring".to_string()),
        priority,
        send_after: None,
    }
}

#[tokio::test]
async fn new_domain_starts_pending_on_default_port() {
    let (_dir, store) = setup().await;
    let user_id = add_user(&store, "a@example.com", true).await;
    let domain_id = add_domain(&store, &user_id, "example.com", true).await;

    let domain = store.get_domain(&domain_id).await.unwrap().unwrap();
    assert_eq!(domain.port, 443);
    assert_eq!(domain.status, DomainStatus::Pending);
    assert!(domain.last_checked_at.is_none());
    assert!(domain.san.is_empty());
}

#[tokio::test]
async fn due_query_requires_confirmation_and_staleness() {
    let (_dir, store) = setup().await;
    let confirmed = add_user(&store, "a@example.com", true).await;
    let unconfirmed = add_user(&store, "b@example.com", false).await;

    let never_checked = add_domain(&store, &confirmed, "fresh.example.com", true).await;
    let stale = add_domain(&store, &confirmed, "stale.example.com", true).await;
    let recent = add_domain(&store, &confirmed, "recent.example.com", true).await;
    add_domain(&store, &confirmed, "unconfirmed.example.com", false).await;
    add_domain(&store, &unconfirmed, "orphan.example.com", true).await;

    for (id, at) in [(&stale, now() - Duration::hours(7)), (&recent, now() - Duration::hours(1))] {
        let tx = store.begin().await.unwrap();
        tx.record_domain_failure(id, at, "connection refused", at)
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    let due = store
        .query_domains_due_for_check(now() - Duration::hours(6))
        .await
        .unwrap();
    let ids: Vec<&str> = due.iter().map(|d| d.domain.id.as_str()).collect();
    assert_eq!(ids, vec![never_checked.as_str(), stale.as_str()]);
    assert_eq!(due[0].owner.email, "a@example.com");
}

#[tokio::test]
async fn committed_failure_writes_check_and_error_state() {
    let (_dir, store) = setup().await;
    let user_id = add_user(&store, "a@example.com", true).await;
    let domain_id = add_domain(&store, &user_id, "example.com", true).await;

    let tx = store.begin().await.unwrap();
    tx.insert_check(&domain_id, now(), &CheckOutcome::Failure("timeout".to_string()))
        .await
        .unwrap();
    tx.record_domain_failure(&domain_id, now(), "timeout", now())
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let domain = store.get_domain(&domain_id).await.unwrap().unwrap();
    assert_eq!(domain.error.as_deref(), Some("timeout"));
    assert_eq!(domain.error_started_at, Some(now()));
    assert_eq!(domain.last_checked_at, Some(now()));
    assert_eq!(domain.status, DomainStatus::Pending);

    let checks = store.list_checks_for_domain(&domain_id, 10).await.unwrap();
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].error.as_deref(), Some("timeout"));
    assert!(checks[0].fingerprint.is_none());
}

#[tokio::test]
async fn rollback_and_drop_discard_every_write() {
    let (_dir, store) = setup().await;
    let user_id = add_user(&store, "a@example.com", true).await;
    let domain_id = add_domain(&store, &user_id, "example.com", true).await;

    let tx = store.begin().await.unwrap();
    tx.insert_check(&domain_id, now(), &CheckOutcome::Failure("boom".to_string()))
        .await
        .unwrap();
    tx.enqueue_job(&job("rolled back", OutboxPriority::High))
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    {
        let tx = store.begin().await.unwrap();
        tx.record_domain_failure(&domain_id, now(), "boom", now())
            .await
            .unwrap();
        // dropped without commit
    }

    assert!(store
        .list_checks_for_domain(&domain_id, 10)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        store.count_outbox_jobs(&OutboxFilter::default()).await.unwrap(),
        0
    );
    let domain = store.get_domain(&domain_id).await.unwrap().unwrap();
    assert!(domain.error.is_none());
    assert!(domain.last_checked_at.is_none());
}

#[tokio::test]
async fn success_overwrites_snapshot_and_clears_error() {
    let (_dir, store) = setup().await;
    let user_id = add_user(&store, "a@example.com", true).await;
    let domain_id = add_domain(&store, &user_id, "example.com", true).await;

    let tx = store.begin().await.unwrap();
    tx.record_domain_failure(&domain_id, now() - Duration::hours(1), "refused", now() - Duration::hours(1))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let update = DomainSnapshotUpdate {
        checked_at: now(),
        status: DomainStatus::Expiring30Days,
        certificate: cert("AA:BB"),
        last_notified_at: Some(now()),
        last_cert_change_notified_at: None,
    };
    let tx = store.begin().await.unwrap();
    tx.insert_check(&domain_id, now(), &CheckOutcome::Success(cert("AA:BB")))
        .await
        .unwrap();
    tx.record_domain_success(&domain_id, &update).await.unwrap();
    tx.commit().await.unwrap();

    let domain = store.get_domain(&domain_id).await.unwrap().unwrap();
    assert_eq!(domain.status, DomainStatus::Expiring30Days);
    assert_eq!(domain.fingerprint.as_deref(), Some("AA:BB"));
    assert_eq!(domain.san, vec!["example.com", "www.example.com"]);
    assert_eq!(domain.not_after, Some(now() + Duration::days(30)));
    assert!(domain.error.is_none());
    assert!(domain.error_started_at.is_none());
    assert_eq!(domain.last_notified_at, Some(now()));
    assert!(domain.last_cert_change_notified_at.is_none());

    // A later success without notifications keeps the earlier stamp.
    let later = DomainSnapshotUpdate {
        checked_at: now() + Duration::hours(6),
        last_notified_at: None,
        ..update
    };
    let tx = store.begin().await.unwrap();
    tx.record_domain_success(&domain_id, &later).await.unwrap();
    tx.commit().await.unwrap();

    let domain = store.get_domain(&domain_id).await.unwrap().unwrap();
    assert_eq!(domain.last_notified_at, Some(now()));
    assert_eq!(domain.last_checked_at, Some(now() + Duration::hours(6)));
}

#[tokio::test]
async fn record_on_missing_domain_is_not_found() {
    let (_dir, store) = setup().await;
    let tx = store.begin().await.unwrap();
    let err = tx
        .record_domain_failure("missing", now(), "x", now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { entity: "domain", .. }));
}

#[tokio::test]
async fn checks_are_listed_newest_first() {
    let (_dir, store) = setup().await;
    let user_id = add_user(&store, "a@example.com", true).await;
    let domain_id = add_domain(&store, &user_id, "example.com", true).await;

    let tx = store.begin().await.unwrap();
    for hours in [3, 1, 2] {
        tx.insert_check(
            &domain_id,
            now() - Duration::hours(hours),
            &CheckOutcome::Success(cert(&format!("FP{hours}"))),
        )
        .await
        .unwrap();
    }
    tx.commit().await.unwrap();

    let checks = store.list_checks_for_domain(&domain_id, 2).await.unwrap();
    let fps: Vec<_> = checks.iter().filter_map(|c| c.fingerprint.as_deref()).collect();
    assert_eq!(fps, vec!["FP1", "FP2"]);
}

#[tokio::test]
async fn due_jobs_respect_priority_and_delays() {
    let (_dir, store) = setup().await;

    let low = store.enqueue_job(&job("low", OutboxPriority::Low)).await.unwrap();
    let medium = store.enqueue_job(&job("medium", OutboxPriority::Medium)).await.unwrap();
    let high = store.enqueue_job(&job("high", OutboxPriority::High)).await.unwrap();
    let deferred = store
        .enqueue_job(&NewOutboxJob {
            send_after: Some(Utc::now() + Duration::hours(1)),
            ..job("deferred", OutboxPriority::High)
        })
        .await
        .unwrap();
    let retrying = store.enqueue_job(&job("retrying", OutboxPriority::High)).await.unwrap();
    store
        .schedule_job_retry(&retrying, 1, Utc::now() + Duration::minutes(5))
        .await
        .unwrap();

    let due = store.fetch_due_jobs(Utc::now(), 10).await.unwrap();
    let ids: Vec<&str> = due.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec![high.as_str(), medium.as_str(), low.as_str()]);

    let limited = store.fetch_due_jobs(Utc::now(), 2).await.unwrap();
    assert_eq!(limited.len(), 2);

    let later = store
        .fetch_due_jobs(Utc::now() + Duration::hours(2), 10)
        .await
        .unwrap();
    assert!(later.iter().any(|j| j.id == deferred));
    assert!(later.iter().any(|j| j.id == retrying));
}

#[tokio::test]
async fn terminal_jobs_never_transition_again() {
    let (_dir, store) = setup().await;
    let done = store.enqueue_job(&job("done", OutboxPriority::Medium)).await.unwrap();
    let dead = store.enqueue_job(&job("dead", OutboxPriority::Medium)).await.unwrap();

    store.mark_job_completed(&done, now()).await.unwrap();
    store.mark_job_failed(&dead, 15).await.unwrap();

    let completed = store.get_outbox_job(&done).await.unwrap().unwrap();
    assert_eq!(completed.status, OutboxStatus::Completed);
    assert_eq!(completed.completed_at, Some(now()));
    assert!(completed.retry_after.is_none());

    let failed = store.get_outbox_job(&dead).await.unwrap().unwrap();
    assert_eq!(failed.status, OutboxStatus::Failed);
    assert_eq!(failed.failed_attempts, 15);

    assert!(store.mark_job_failed(&done, 1).await.is_err());
    assert!(store
        .schedule_job_retry(&dead, 16, now())
        .await
        .is_err());
    assert!(store.fetch_due_jobs(Utc::now(), 10).await.unwrap().is_empty());

    let pending = OutboxFilter {
        status: Some(OutboxStatus::Pending),
        ..Default::default()
    };
    assert_eq!(store.count_outbox_jobs(&pending).await.unwrap(), 0);
}

#[tokio::test]
async fn heartbeat_candidates_group_confirmed_domains_per_user() {
    let (_dir, store) = setup().await;
    let alice = add_user(&store, "alice@example.com", true).await;
    let bob = add_user(&store, "bob@example.com", true).await;
    let carol = add_user(&store, "carol@example.com", false).await;
    let dave = store
        .insert_user(&NewUser {
            email: "dave@example.com".to_string(),
            confirmed: true,
            settings_token: "token-dave".to_string(),
            send_heartbeat_report: false,
        })
        .await
        .unwrap()
        .id;

    add_domain(&store, &alice, "b.example.com", true).await;
    add_domain(&store, &alice, "a.example.com", true).await;
    add_domain(&store, &alice, "hidden.example.com", false).await;
    add_domain(&store, &bob, "unconfirmed.example.com", false).await;
    add_domain(&store, &carol, "carol.example.com", true).await;
    add_domain(&store, &dave, "dave.example.com", true).await;

    let candidates = store.list_heartbeat_candidates().await.unwrap();
    assert_eq!(candidates.len(), 1);
    let (user, domains) = &candidates[0];
    assert_eq!(user.id, alice);
    let names: Vec<&str> = domains.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["a.example.com", "b.example.com"]);

    store
        .update_last_heartbeat_sent_at(&alice, now())
        .await
        .unwrap();
    let user = store.get_user(&alice).await.unwrap().unwrap();
    assert_eq!(user.last_heartbeat_sent_at, Some(now()));
}
