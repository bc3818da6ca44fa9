use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, TransactionTrait};

use crate::error::{Result, StorageError};

pub mod check;
pub mod domain;
pub mod outbox;
pub mod transaction;
pub mod user;

pub use domain::DomainSnapshotUpdate;
pub use outbox::OutboxFilter;
pub use transaction::StoreTransaction;

/// Access layer over the monitoring database.
///
/// All methods are `async fn` on top of SeaORM. One `CertStore` is created
/// per process and shared behind an `Arc` by every loop.
pub struct CertStore {
    pub(crate) db: DatabaseConnection,
}

impl CertStore {
    /// Connects to `db_url` and brings the schema up to date.
    ///
    /// SQLite example: `sqlite://data/certmon.db?mode=rwc`.
    pub async fn new(db_url: &str, max_connections: u32) -> Result<Self> {
        let mut options = ConnectOptions::new(db_url.to_string());
        options
            .max_connections(max_connections.max(1))
            .sqlx_logging(false);
        let db = Database::connect(options).await?;

        // WAL only makes sense for file-backed SQLite.
        if db_url.starts_with("sqlite://") && !db_url.contains(":memory:") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        Migrator::up(&db, None).await?;

        tracing::info!(db_url = %redact_url(db_url), "Initialized cert store");
        Ok(Self { db })
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Opens a transaction scope. Nothing written through it is visible to
    /// other connections until [`StoreTransaction::commit`]; dropping it
    /// uncommitted rolls everything back.
    pub async fn begin(&self) -> Result<StoreTransaction> {
        let txn = self.db.begin().await?;
        Ok(StoreTransaction::new(txn))
    }
}

pub(crate) fn to_db_time(t: DateTime<Utc>) -> DateTimeWithTimeZone {
    t.fixed_offset()
}

pub(crate) fn from_db_time(t: DateTimeWithTimeZone) -> DateTime<Utc> {
    t.with_timezone(&Utc)
}

pub(crate) fn encode_list(values: &[String]) -> Result<String> {
    Ok(serde_json::to_string(values)?)
}

pub(crate) fn decode_list(column: &'static str, raw: Option<&str>) -> Result<Vec<String>> {
    match raw {
        None => Ok(Vec::new()),
        Some(s) => serde_json::from_str(s).map_err(|_| StorageError::InvalidValue {
            column,
            value: s.to_string(),
        }),
    }
}

/// Strips credentials from a connection URL before it is logged.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
