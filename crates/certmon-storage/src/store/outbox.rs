use certmon_common::types::{NewOutboxJob, OutboxJob, OutboxStatus};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};

use crate::entities::outbox_job::{self, Column as JobCol, Entity as JobEntity};
use crate::error::{Result, StorageError};
use crate::store::{decode_list, encode_list, from_db_time, to_db_time, CertStore};

/// Filter for counting outbox jobs.
#[derive(Debug, Clone, Default)]
pub struct OutboxFilter {
    pub status: Option<OutboxStatus>,
    pub template_name: Option<String>,
}

fn model_to_job(m: outbox_job::Model) -> Result<OutboxJob> {
    let status = m
        .status
        .parse::<OutboxStatus>()
        .map_err(|_| StorageError::InvalidValue {
            column: "outbox_jobs.status",
            value: m.status.clone(),
        })?;
    Ok(OutboxJob {
        recipients: decode_list("outbox_jobs.recipients", Some(&m.recipients))?,
        id: m.id,
        subject: m.subject,
        body: m.body,
        template_name: m.template_name,
        priority: m.priority,
        status,
        failed_attempts: m.failed_attempts,
        send_after: m.send_after.map(from_db_time),
        retry_after: m.retry_after.map(from_db_time),
        created_at: from_db_time(m.created_at),
        completed_at: m.completed_at.map(from_db_time),
    })
}

pub(crate) async fn insert_job<C: ConnectionTrait>(conn: &C, job: &NewOutboxJob) -> Result<String> {
    let id = certmon_common::id::next_id();
    let am = outbox_job::ActiveModel {
        id: Set(id.clone()),
        recipients: Set(encode_list(&job.recipients)?),
        subject: Set(job.subject.clone()),
        body: Set(job.body.clone()),
        template_name: Set(job.template_name.clone()),
        priority: Set(job.priority.value()),
        status: Set(OutboxStatus::Pending.as_str().to_string()),
        failed_attempts: Set(0),
        send_after: Set(job.send_after.map(to_db_time)),
        retry_after: Set(None),
        created_at: Set(Utc::now().fixed_offset()),
        completed_at: Set(None),
    };
    am.insert(conn).await?;
    Ok(id)
}

/// Only pending jobs may transition; a job that already reached a terminal
/// state is reported as not found.
fn ensure_pending_updated(rows_affected: u64, job_id: &str) -> Result<()> {
    if rows_affected == 0 {
        return Err(StorageError::NotFound {
            entity: "pending outbox job",
            id: job_id.to_string(),
        });
    }
    Ok(())
}

impl CertStore {
    // ---- outbox ----

    /// Inserts a pending job outside any transaction and returns its id.
    pub async fn enqueue_job(&self, job: &NewOutboxJob) -> Result<String> {
        insert_job(self.db(), job).await
    }

    pub async fn get_outbox_job(&self, id: &str) -> Result<Option<OutboxJob>> {
        let model = JobEntity::find_by_id(id).one(self.db()).await?;
        model.map(model_to_job).transpose()
    }

    /// Pending jobs whose `send_after` and `retry_after` have both elapsed,
    /// most urgent first and FIFO within a priority.
    pub async fn fetch_due_jobs(&self, now: DateTime<Utc>, limit: u64) -> Result<Vec<OutboxJob>> {
        let now = to_db_time(now);
        let rows = JobEntity::find()
            .filter(JobCol::Status.eq(OutboxStatus::Pending.as_str()))
            .filter(
                Condition::any()
                    .add(JobCol::SendAfter.is_null())
                    .add(JobCol::SendAfter.lte(now)),
            )
            .filter(
                Condition::any()
                    .add(JobCol::RetryAfter.is_null())
                    .add(JobCol::RetryAfter.lte(now)),
            )
            .order_by_asc(JobCol::Priority)
            .order_by_asc(JobCol::CreatedAt)
            .order_by_asc(JobCol::Id)
            .limit(limit)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_job).collect()
    }

    pub async fn mark_job_completed(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let res = JobEntity::update_many()
            .col_expr(JobCol::Status, Expr::value(OutboxStatus::Completed.as_str()))
            .col_expr(JobCol::CompletedAt, Expr::value(Some(to_db_time(at))))
            .col_expr(
                JobCol::RetryAfter,
                Expr::value(Option::<sea_orm::prelude::DateTimeWithTimeZone>::None),
            )
            .filter(JobCol::Id.eq(id))
            .filter(JobCol::Status.eq(OutboxStatus::Pending.as_str()))
            .exec(self.db())
            .await?;
        ensure_pending_updated(res.rows_affected, id)
    }

    /// Moves a job to the terminal `Failed` state with its final attempt count.
    pub async fn mark_job_failed(&self, id: &str, failed_attempts: i32) -> Result<()> {
        let res = JobEntity::update_many()
            .col_expr(JobCol::Status, Expr::value(OutboxStatus::Failed.as_str()))
            .col_expr(JobCol::FailedAttempts, Expr::value(failed_attempts))
            .filter(JobCol::Id.eq(id))
            .filter(JobCol::Status.eq(OutboxStatus::Pending.as_str()))
            .exec(self.db())
            .await?;
        ensure_pending_updated(res.rows_affected, id)
    }

    pub async fn schedule_job_retry(
        &self,
        id: &str,
        failed_attempts: i32,
        retry_after: DateTime<Utc>,
    ) -> Result<()> {
        let res = JobEntity::update_many()
            .col_expr(JobCol::FailedAttempts, Expr::value(failed_attempts))
            .col_expr(JobCol::RetryAfter, Expr::value(Some(to_db_time(retry_after))))
            .filter(JobCol::Id.eq(id))
            .filter(JobCol::Status.eq(OutboxStatus::Pending.as_str()))
            .exec(self.db())
            .await?;
        ensure_pending_updated(res.rows_affected, id)
    }

    pub async fn count_outbox_jobs(&self, filter: &OutboxFilter) -> Result<u64> {
        let mut q = JobEntity::find();
        if let Some(status) = filter.status {
            q = q.filter(JobCol::Status.eq(status.as_str()));
        }
        if let Some(ref name) = filter.template_name {
            q = q.filter(JobCol::TemplateName.eq(name.as_str()));
        }
        Ok(q.count(self.db()).await?)
    }
}
