use std::collections::HashMap;

use certmon_common::types::{DomainRecord, NewUser, UserRecord};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter,
    QueryOrder,
};

use crate::entities::domain::{Column as DomainCol, Entity as DomainEntity};
use crate::entities::user::{self, Column as UserCol, Entity as UserEntity};
use crate::error::{Result, StorageError};
use crate::store::domain::model_to_domain;
use crate::store::{from_db_time, to_db_time, CertStore};

pub(crate) fn model_to_user(m: user::Model) -> UserRecord {
    UserRecord {
        id: m.id,
        email: m.email,
        confirmed: m.confirmed,
        settings_token: m.settings_token,
        send_heartbeat_report: m.send_heartbeat_report,
        last_heartbeat_sent_at: m.last_heartbeat_sent_at.map(from_db_time),
        created_at: from_db_time(m.created_at),
        updated_at: from_db_time(m.updated_at),
    }
}

impl CertStore {
    // ---- users ----

    pub async fn insert_user(&self, req: &NewUser) -> Result<UserRecord> {
        let id = certmon_common::id::next_id();
        let now = Utc::now().fixed_offset();
        let am = user::ActiveModel {
            id: Set(id.clone()),
            email: Set(req.email.clone()),
            confirmed: Set(req.confirmed),
            settings_token: Set(req.settings_token.clone()),
            send_heartbeat_report: Set(req.send_heartbeat_report),
            last_heartbeat_sent_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        am.insert(self.db()).await?;
        self.get_user(&id)
            .await?
            .ok_or(StorageError::InsertReadback { entity: "user" })
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<UserRecord>> {
        let model = UserEntity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(model_to_user))
    }

    /// Confirmed users who opted into the periodic report, each paired with
    /// their confirmed domains. Users without any confirmed domain are left
    /// out.
    pub async fn list_heartbeat_candidates(&self) -> Result<Vec<(UserRecord, Vec<DomainRecord>)>> {
        let users = UserEntity::find()
            .filter(UserCol::Confirmed.eq(true))
            .filter(UserCol::SendHeartbeatReport.eq(true))
            .order_by_asc(UserCol::CreatedAt)
            .order_by_asc(UserCol::Id)
            .all(self.db())
            .await?;
        if users.is_empty() {
            return Ok(Vec::new());
        }

        let user_ids: Vec<String> = users.iter().map(|u| u.id.clone()).collect();
        let domains = DomainEntity::find()
            .filter(DomainCol::Confirmed.eq(true))
            .filter(DomainCol::UserId.is_in(user_ids))
            .order_by_asc(DomainCol::Name)
            .order_by_asc(DomainCol::Port)
            .all(self.db())
            .await?;

        let mut by_user: HashMap<String, Vec<DomainRecord>> = HashMap::new();
        for m in domains {
            let record = model_to_domain(m)?;
            by_user.entry(record.user_id.clone()).or_default().push(record);
        }

        Ok(users
            .into_iter()
            .filter_map(|u| {
                let domains = by_user.remove(&u.id)?;
                Some((model_to_user(u), domains))
            })
            .collect())
    }

    pub async fn update_last_heartbeat_sent_at(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let res = UserEntity::update_many()
            .col_expr(UserCol::LastHeartbeatSentAt, Expr::value(Some(to_db_time(at))))
            .col_expr(UserCol::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(UserCol::Id.eq(user_id))
            .exec(self.db())
            .await?;
        if res.rows_affected == 0 {
            return Err(StorageError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            });
        }
        Ok(())
    }
}
