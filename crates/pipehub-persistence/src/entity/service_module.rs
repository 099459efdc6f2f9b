//! `SeaORM` Entity for the modules table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "modules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub service_id: String,
    pub service_name: String,
    pub host: String,
    pub port: i32,
    #[sea_orm(nullable)]
    pub version: Option<String>,
    #[sea_orm(nullable)]
    pub config_schema_id: Option<String>,
    /// Free-form key-value metadata stored as JSON text
    #[sea_orm(column_type = "Text", nullable)]
    pub metadata: Option<String>,
    pub registered_at: DateTime,
    pub last_heartbeat: DateTime,
    pub status: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::config_schema::Entity",
        from = "Column::ConfigSchemaId",
        to = "super::config_schema::Column::SchemaId"
    )]
    ConfigSchema,
}

impl Related<super::config_schema::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ConfigSchema.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// An instance is considered healthy when it has heartbeated within the
    /// last 30 seconds.
    pub fn is_healthy(&self) -> bool {
        let threshold = chrono::Utc::now().naive_utc() - chrono::Duration::seconds(30);
        self.last_heartbeat > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(last_heartbeat: DateTime) -> Model {
        Model {
            service_id: "orders-10-0-0-4-9090".to_string(),
            service_name: "orders".to_string(),
            host: "10.0.0.4".to_string(),
            port: 9090,
            version: Some("1.2.0".to_string()),
            config_schema_id: None,
            metadata: None,
            registered_at: last_heartbeat,
            last_heartbeat,
            status: "ACTIVE".to_string(),
        }
    }

    #[test]
    fn test_recent_heartbeat_is_healthy() {
        let now = chrono::Utc::now().naive_utc();
        assert!(model(now).is_healthy());
    }

    #[test]
    fn test_stale_heartbeat_is_unhealthy() {
        let stale = chrono::Utc::now().naive_utc() - chrono::Duration::seconds(31);
        assert!(!model(stale).is_healthy());
    }
}
