use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "checks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub domain_id: String,
    pub checked_at: DateTimeWithTimeZone,
    pub not_before: Option<DateTimeWithTimeZone>,
    pub not_after: Option<DateTimeWithTimeZone>,
    pub issuer: Option<String>,
    pub cn: Option<String>,
    pub san: Option<String>,
    pub serial: Option<String>,
    pub fingerprint: Option<String>,
    pub ip: Option<String>,
    pub error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::domain::Entity",
        from = "Column::DomainId",
        to = "super::domain::Column::Id"
    )]
    Domain,
}

impl Related<super::domain::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Domain.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
