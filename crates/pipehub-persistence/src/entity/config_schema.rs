//! `SeaORM` Entity for the config_schemas table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "config_schemas")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub schema_id: String,
    pub service_name: String,
    pub schema_version: String,
    #[sea_orm(column_type = "Text")]
    pub json_schema: String,
    pub created_at: DateTime,
    #[sea_orm(nullable)]
    pub created_by: Option<String>,
    #[sea_orm(nullable)]
    pub apicurio_artifact_id: Option<String>,
    #[sea_orm(nullable)]
    pub apicurio_global_id: Option<i64>,
    pub sync_status: String,
    #[sea_orm(nullable)]
    pub last_sync_attempt: Option<DateTime>,
    #[sea_orm(nullable)]
    pub sync_error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::service_module::Entity")]
    ServiceModule,
}

impl Related<super::service_module::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ServiceModule.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
