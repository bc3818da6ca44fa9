use certmon_common::types::{CertificateInfo, DomainRecord, DomainStatus, DueDomain, NewDomain};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    EntityTrait, QueryFilter, QueryOrder,
};

use crate::entities::domain::{self, Column as DomainCol, Entity as DomainEntity};
use crate::entities::user::{Column as UserCol, Entity as UserEntity};
use crate::error::{Result, StorageError};
use crate::store::user::model_to_user;
use crate::store::{decode_list, encode_list, from_db_time, to_db_time, CertStore};

const DEFAULT_PORT: u16 = 443;

/// New snapshot written to a domain after a successful check.
///
/// The notification stamps are only written when `Some`; `None` leaves the
/// stored value untouched.
#[derive(Debug, Clone)]
pub struct DomainSnapshotUpdate {
    pub checked_at: DateTime<Utc>,
    pub status: DomainStatus,
    pub certificate: CertificateInfo,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub last_cert_change_notified_at: Option<DateTime<Utc>>,
}

pub(crate) fn model_to_domain(m: domain::Model) -> Result<DomainRecord> {
    let status = m
        .status
        .parse::<DomainStatus>()
        .map_err(|_| StorageError::InvalidValue {
            column: "domains.status",
            value: m.status.clone(),
        })?;
    let port = u16::try_from(m.port).map_err(|_| StorageError::InvalidValue {
        column: "domains.port",
        value: m.port.to_string(),
    })?;
    Ok(DomainRecord {
        san: decode_list("domains.san", m.san.as_deref())?,
        id: m.id,
        user_id: m.user_id,
        name: m.name,
        port,
        confirmed: m.confirmed,
        status,
        last_checked_at: m.last_checked_at.map(from_db_time),
        not_before: m.not_before.map(from_db_time),
        not_after: m.not_after.map(from_db_time),
        issuer: m.issuer,
        cn: m.cn,
        serial: m.serial,
        fingerprint: m.fingerprint,
        ip: m.ip,
        error: m.error,
        error_started_at: m.error_started_at.map(from_db_time),
        last_notified_at: m.last_notified_at.map(from_db_time),
        last_cert_change_notified_at: m.last_cert_change_notified_at.map(from_db_time),
        created_at: from_db_time(m.created_at),
        updated_at: from_db_time(m.updated_at),
    })
}

fn ensure_updated(rows_affected: u64, domain_id: &str) -> Result<()> {
    if rows_affected == 0 {
        return Err(StorageError::NotFound {
            entity: "domain",
            id: domain_id.to_string(),
        });
    }
    Ok(())
}

/// Records a failed check on the domain row. The certificate snapshot is
/// left as it was so the last known good values stay visible.
pub(crate) async fn record_domain_failure<C: ConnectionTrait>(
    conn: &C,
    domain_id: &str,
    checked_at: DateTime<Utc>,
    error: &str,
    error_started_at: DateTime<Utc>,
) -> Result<()> {
    let res = DomainEntity::update_many()
        .col_expr(DomainCol::LastCheckedAt, Expr::value(Some(to_db_time(checked_at))))
        .col_expr(DomainCol::Error, Expr::value(Some(error.to_string())))
        .col_expr(
            DomainCol::ErrorStartedAt,
            Expr::value(Some(to_db_time(error_started_at))),
        )
        .col_expr(DomainCol::UpdatedAt, Expr::value(to_db_time(checked_at)))
        .filter(DomainCol::Id.eq(domain_id))
        .exec(conn)
        .await?;
    ensure_updated(res.rows_affected, domain_id)
}

/// Overwrites the domain snapshot and clears any error state.
pub(crate) async fn record_domain_success<C: ConnectionTrait>(
    conn: &C,
    domain_id: &str,
    update: &DomainSnapshotUpdate,
) -> Result<()> {
    let cert = &update.certificate;
    let mut query = DomainEntity::update_many()
        .col_expr(
            DomainCol::LastCheckedAt,
            Expr::value(Some(to_db_time(update.checked_at))),
        )
        .col_expr(DomainCol::Status, Expr::value(update.status.as_str()))
        .col_expr(DomainCol::NotBefore, Expr::value(Some(to_db_time(cert.not_before))))
        .col_expr(DomainCol::NotAfter, Expr::value(Some(to_db_time(cert.not_after))))
        .col_expr(DomainCol::Issuer, Expr::value(cert.issuer.clone()))
        .col_expr(DomainCol::Cn, Expr::value(cert.cn.clone()))
        .col_expr(DomainCol::San, Expr::value(Some(encode_list(&cert.san)?)))
        .col_expr(DomainCol::Serial, Expr::value(cert.serial.clone()))
        .col_expr(DomainCol::Fingerprint, Expr::value(cert.fingerprint.clone()))
        .col_expr(DomainCol::Ip, Expr::value(cert.ip.clone()))
        .col_expr(DomainCol::Error, Expr::value(Option::<String>::None))
        .col_expr(
            DomainCol::ErrorStartedAt,
            Expr::value(Option::<sea_orm::prelude::DateTimeWithTimeZone>::None),
        )
        .col_expr(DomainCol::UpdatedAt, Expr::value(to_db_time(update.checked_at)));
    if let Some(at) = update.last_notified_at {
        query = query.col_expr(DomainCol::LastNotifiedAt, Expr::value(Some(to_db_time(at))));
    }
    if let Some(at) = update.last_cert_change_notified_at {
        query = query.col_expr(
            DomainCol::LastCertChangeNotifiedAt,
            Expr::value(Some(to_db_time(at))),
        );
    }
    let res = query
        .filter(DomainCol::Id.eq(domain_id))
        .exec(conn)
        .await?;
    ensure_updated(res.rows_affected, domain_id)
}

impl CertStore {
    // ---- domains ----

    pub async fn insert_domain(&self, req: &NewDomain) -> Result<DomainRecord> {
        let id = certmon_common::id::next_id();
        let now = Utc::now().fixed_offset();
        let am = domain::ActiveModel {
            id: Set(id.clone()),
            user_id: Set(req.user_id.clone()),
            name: Set(req.name.clone()),
            port: Set(i32::from(req.port.unwrap_or(DEFAULT_PORT))),
            confirmed: Set(req.confirmed),
            status: Set(DomainStatus::Pending.as_str().to_string()),
            last_checked_at: Set(None),
            not_before: Set(None),
            not_after: Set(None),
            issuer: Set(None),
            cn: Set(None),
            san: Set(None),
            serial: Set(None),
            fingerprint: Set(None),
            ip: Set(None),
            error: Set(None),
            error_started_at: Set(None),
            last_notified_at: Set(None),
            last_cert_change_notified_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        am.insert(self.db()).await?;
        self.get_domain(&id)
            .await?
            .ok_or(StorageError::InsertReadback { entity: "domain" })
    }

    pub async fn get_domain(&self, id: &str) -> Result<Option<DomainRecord>> {
        let model = DomainEntity::find_by_id(id).one(self.db()).await?;
        model.map(model_to_domain).transpose()
    }

    /// Confirmed domains of confirmed users that were never checked or were
    /// last checked before `stale_before`, least recently checked first.
    pub async fn query_domains_due_for_check(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<DueDomain>> {
        let rows = DomainEntity::find()
            .find_also_related(UserEntity)
            .filter(DomainCol::Confirmed.eq(true))
            .filter(UserCol::Confirmed.eq(true))
            .filter(
                Condition::any()
                    .add(DomainCol::LastCheckedAt.is_null())
                    .add(DomainCol::LastCheckedAt.lt(to_db_time(stale_before))),
            )
            .order_by_asc(DomainCol::LastCheckedAt)
            .order_by_asc(DomainCol::Id)
            .all(self.db())
            .await?;

        let mut due = Vec::with_capacity(rows.len());
        for (domain, owner) in rows {
            let Some(owner) = owner else {
                tracing::warn!(domain_id = %domain.id, "Domain has no owner row, skipping");
                continue;
            };
            due.push(DueDomain {
                domain: model_to_domain(domain)?,
                owner: model_to_user(owner),
            });
        }
        Ok(due)
    }
}
