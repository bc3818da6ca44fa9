use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Tables in dependency order.
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    email TEXT NOT NULL UNIQUE,
    confirmed INTEGER NOT NULL DEFAULT 0,
    settings_token TEXT NOT NULL UNIQUE,
    send_heartbeat_report INTEGER NOT NULL DEFAULT 1,
    last_heartbeat_sent_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS domains (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    port INTEGER NOT NULL DEFAULT 443,
    confirmed INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'PENDING',
    last_checked_at TEXT,
    not_before TEXT,
    not_after TEXT,
    issuer TEXT,
    cn TEXT,
    san TEXT,
    serial TEXT,
    fingerprint TEXT,
    ip TEXT,
    error TEXT,
    error_started_at TEXT,
    last_notified_at TEXT,
    last_cert_change_notified_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (user_id, name, port)
);
CREATE INDEX IF NOT EXISTS idx_domains_user_id ON domains(user_id);
CREATE INDEX IF NOT EXISTS idx_domains_last_checked_at ON domains(last_checked_at);

CREATE TABLE IF NOT EXISTS checks (
    id TEXT PRIMARY KEY NOT NULL,
    domain_id TEXT NOT NULL REFERENCES domains(id) ON DELETE CASCADE,
    checked_at TEXT NOT NULL,
    not_before TEXT,
    not_after TEXT,
    issuer TEXT,
    cn TEXT,
    san TEXT,
    serial TEXT,
    fingerprint TEXT,
    ip TEXT,
    error TEXT
);
CREATE INDEX IF NOT EXISTS idx_checks_domain_id ON checks(domain_id);
CREATE INDEX IF NOT EXISTS idx_checks_checked_at ON checks(checked_at);

CREATE TABLE IF NOT EXISTS outbox_jobs (
    id TEXT PRIMARY KEY NOT NULL,
    recipients TEXT NOT NULL,
    subject TEXT NOT NULL,
    body TEXT NOT NULL,
    template_name TEXT,
    priority INTEGER NOT NULL DEFAULT 5,
    status TEXT NOT NULL DEFAULT 'Pending',
    failed_attempts INTEGER NOT NULL DEFAULT 0,
    send_after TEXT,
    retry_after TEXT,
    created_at TEXT NOT NULL,
    completed_at TEXT
);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS outbox_jobs;
DROP TABLE IF EXISTS checks;
DROP TABLE IF EXISTS domains;
DROP TABLE IF EXISTS users;
";
