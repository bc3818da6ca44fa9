use certmon_common::types::{CheckOutcome, CheckRecord};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};

use crate::entities::check::{self, Column as CheckCol, Entity as CheckEntity};
use crate::error::Result;
use crate::store::{decode_list, encode_list, from_db_time, to_db_time, CertStore};

fn model_to_check(m: check::Model) -> Result<CheckRecord> {
    Ok(CheckRecord {
        san: decode_list("checks.san", m.san.as_deref())?,
        id: m.id,
        domain_id: m.domain_id,
        checked_at: from_db_time(m.checked_at),
        not_before: m.not_before.map(from_db_time),
        not_after: m.not_after.map(from_db_time),
        issuer: m.issuer,
        cn: m.cn,
        serial: m.serial,
        fingerprint: m.fingerprint,
        ip: m.ip,
        error: m.error,
    })
}

/// Appends one row to the check history. Rows are never updated afterwards.
pub(crate) async fn insert_check<C: ConnectionTrait>(
    conn: &C,
    domain_id: &str,
    checked_at: DateTime<Utc>,
    outcome: &CheckOutcome,
) -> Result<String> {
    let id = certmon_common::id::next_id();
    let mut am = check::ActiveModel {
        id: Set(id.clone()),
        domain_id: Set(domain_id.to_string()),
        checked_at: Set(to_db_time(checked_at)),
        not_before: Set(None),
        not_after: Set(None),
        issuer: Set(None),
        cn: Set(None),
        san: Set(None),
        serial: Set(None),
        fingerprint: Set(None),
        ip: Set(None),
        error: Set(None),
    };
    match outcome {
        CheckOutcome::Success(cert) => {
            am.not_before = Set(Some(to_db_time(cert.not_before)));
            am.not_after = Set(Some(to_db_time(cert.not_after)));
            am.issuer = Set(cert.issuer.clone());
            am.cn = Set(cert.cn.clone());
            am.san = Set(Some(encode_list(&cert.san)?));
            am.serial = Set(cert.serial.clone());
            am.fingerprint = Set(cert.fingerprint.clone());
            am.ip = Set(cert.ip.clone());
        }
        CheckOutcome::Failure(error) => {
            am.error = Set(Some(error.clone()));
        }
    }
    am.insert(conn).await?;
    Ok(id)
}

impl CertStore {
    // ---- check history ----

    /// Most recent checks of a domain, newest first.
    pub async fn list_checks_for_domain(&self, domain_id: &str, limit: u64) -> Result<Vec<CheckRecord>> {
        let rows = CheckEntity::find()
            .filter(CheckCol::DomainId.eq(domain_id))
            .order_by_desc(CheckCol::CheckedAt)
            .order_by_desc(CheckCol::Id)
            .limit(limit)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_check).collect()
    }
}
