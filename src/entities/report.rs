use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reports")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub report_number: String,
    pub complainant_name: String,
    pub complainant_phone: String,
    pub incident_type: String,
    pub incident_date: String, // YYYY-MM-DD
    pub incident_location: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub accused_name: String,
    pub status: String,
    pub owner_id: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::status_update::Entity")]
    StatusUpdate,
}

impl Related<super::status_update::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StatusUpdate.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
