use certmon_common::types::{CheckOutcome, NewOutboxJob};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseTransaction;

use crate::error::Result;
use crate::store::domain::{record_domain_failure, record_domain_success, DomainSnapshotUpdate};
use crate::store::{check, outbox};

/// An open write scope over the store.
///
/// Every write made through it becomes visible at once on [`commit`], or
/// not at all. Dropping the value without committing rolls back.
///
/// [`commit`]: StoreTransaction::commit
pub struct StoreTransaction {
    txn: DatabaseTransaction,
}

impl StoreTransaction {
    pub(crate) fn new(txn: DatabaseTransaction) -> Self {
        Self { txn }
    }

    /// Appends a check row and returns its id.
    pub async fn insert_check(
        &self,
        domain_id: &str,
        checked_at: DateTime<Utc>,
        outcome: &CheckOutcome,
    ) -> Result<String> {
        check::insert_check(&self.txn, domain_id, checked_at, outcome).await
    }

    pub async fn record_domain_failure(
        &self,
        domain_id: &str,
        checked_at: DateTime<Utc>,
        error: &str,
        error_started_at: DateTime<Utc>,
    ) -> Result<()> {
        record_domain_failure(&self.txn, domain_id, checked_at, error, error_started_at).await
    }

    pub async fn record_domain_success(
        &self,
        domain_id: &str,
        update: &DomainSnapshotUpdate,
    ) -> Result<()> {
        record_domain_success(&self.txn, domain_id, update).await
    }

    pub async fn enqueue_job(&self, job: &NewOutboxJob) -> Result<String> {
        outbox::insert_job(&self.txn, job).await
    }

    pub async fn commit(self) -> Result<()> {
        self.txn.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.txn.rollback().await?;
        Ok(())
    }
}
