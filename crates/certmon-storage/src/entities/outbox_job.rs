use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "outbox_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// JSON array of addresses.
    pub recipients: String,
    pub subject: String,
    pub body: String,
    pub template_name: Option<String>,
    pub priority: i32,
    pub status: String,
    pub failed_attempts: i32,
    pub send_after: Option<DateTimeWithTimeZone>,
    pub retry_after: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub completed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
