use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "domains")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub port: i32,
    pub confirmed: bool,
    pub status: String,
    pub last_checked_at: Option<DateTimeWithTimeZone>,
    pub not_before: Option<DateTimeWithTimeZone>,
    pub not_after: Option<DateTimeWithTimeZone>,
    pub issuer: Option<String>,
    pub cn: Option<String>,
    /// JSON array of DNS names.
    pub san: Option<String>,
    pub serial: Option<String>,
    pub fingerprint: Option<String>,
    pub ip: Option<String>,
    pub error: Option<String>,
    pub error_started_at: Option<DateTimeWithTimeZone>,
    pub last_notified_at: Option<DateTimeWithTimeZone>,
    pub last_cert_change_notified_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::check::Entity")]
    Check,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::check::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Check.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
