//! SQL implementation of the registry store.
//!
//! All mutations run inside explicit transactions; reads go straight to the
//! pool. Schema mirroring to the artifact registry is best effort and is
//! recorded in the row's sync status rather than failing the caller.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::{Set, Unchanged},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::{debug, info, warn};

use pipehub_apicurio::SchemaRegistryClient;
use pipehub_common::ids;

use crate::entity::{config_schema, service_module};
use crate::model::{ServiceStatus, SyncStatus};
use crate::traits::RegistryStore;

const STALE_AFTER_SECONDS: i64 = 30;

pub struct SqlRegistryStore {
    db: DatabaseConnection,
    registry: Arc<dyn SchemaRegistryClient>,
}

impl SqlRegistryStore {
    pub fn new(db: DatabaseConnection, registry: Arc<dyn SchemaRegistryClient>) -> Self {
        Self { db, registry }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    fn metadata_changed(existing: Option<&str>, incoming: &serde_json::Value) -> bool {
        match existing {
            None => !incoming.is_null(),
            Some(text) => match serde_json::from_str::<serde_json::Value>(text) {
                Ok(value) => &value != incoming,
                Err(_) => true,
            },
        }
    }
}

#[async_trait]
impl RegistryStore for SqlRegistryStore {
    async fn register_module(
        &self,
        service_name: &str,
        host: &str,
        port: i32,
        version: &str,
        metadata: serde_json::Value,
        json_schema: Option<&str>,
    ) -> anyhow::Result<service_module::Model> {
        let service_id = ids::service_id(service_name, host, port);
        let now = Utc::now().naive_utc();

        let tx = self.db.begin().await?;

        // Schema first, so the module row can reference it
        let schema_id = match json_schema.filter(|s| !s.trim().is_empty()) {
            Some(schema) => {
                let schema_id = ids::schema_id(service_name, version);
                let existing = config_schema::Entity::find_by_id(&schema_id)
                    .one(&tx)
                    .await?;
                if existing.is_none() {
                    let row = config_schema::ActiveModel {
                        schema_id: Set(schema_id.clone()),
                        service_name: Set(service_name.to_string()),
                        schema_version: Set(version.to_string()),
                        json_schema: Set(schema.to_string()),
                        created_at: Set(now),
                        sync_status: Set(SyncStatus::Pending.as_str().to_string()),
                        ..Default::default()
                    };
                    row.insert(&tx).await?;
                }
                Some(schema_id)
            }
            None => None,
        };

        let metadata_text = serde_json::to_string(&metadata)?;

        let model = match service_module::Entity::find_by_id(&service_id).one(&tx).await? {
            Some(existing) => {
                let mut row: service_module::ActiveModel = existing.clone().into();
                let mut has_changes = false;

                if existing.version.as_deref() != Some(version) {
                    row.version = Set(Some(version.to_string()));
                    has_changes = true;
                }
                if Self::metadata_changed(existing.metadata.as_deref(), &metadata) {
                    row.metadata = Set(Some(metadata_text));
                    has_changes = true;
                }
                if existing.config_schema_id != schema_id {
                    row.config_schema_id = Set(schema_id);
                    has_changes = true;
                }

                // Heartbeat and status refresh on every re-registration
                row.last_heartbeat = Set(now);
                row.status = Set(ServiceStatus::Active.as_str().to_string());

                if has_changes {
                    info!(service_id = %service_id, "Updating existing module registration");
                } else {
                    debug!(service_id = %service_id, "Module unchanged, refreshing heartbeat");
                }
                row.update(&tx).await?
            }
            None => {
                info!(service_id = %service_id, "Creating new module registration");
                let row = service_module::ActiveModel {
                    service_id: Set(service_id.clone()),
                    service_name: Set(service_name.to_string()),
                    host: Set(host.to_string()),
                    port: Set(port),
                    version: Set(Some(version.to_string())),
                    config_schema_id: Set(schema_id),
                    metadata: Set(Some(metadata_text)),
                    registered_at: Set(now),
                    last_heartbeat: Set(now),
                    status: Set(ServiceStatus::Active.as_str().to_string()),
                };
                row.insert(&tx).await?
            }
        };

        tx.commit().await?;
        Ok(model)
    }

    async fn save_schema(
        &self,
        service_name: &str,
        version: &str,
        json_schema: &str,
    ) -> anyhow::Result<config_schema::Model> {
        let schema_id = ids::schema_id(service_name, version);
        let now = Utc::now().naive_utc();

        let tx = self.db.begin().await?;
        let row = config_schema::ActiveModel {
            schema_id: Set(schema_id.clone()),
            service_name: Set(service_name.to_string()),
            schema_version: Set(version.to_string()),
            json_schema: Set(json_schema.to_string()),
            created_at: Set(now),
            sync_status: Set(SyncStatus::Pending.as_str().to_string()),
            ..Default::default()
        };
        row.insert(&tx).await?;
        tx.commit().await?;

        // Mirror to the artifact registry, best effort
        match self
            .registry
            .create_or_update(service_name, version, json_schema)
            .await
        {
            Ok(registration) => {
                self.mark_schema_synced(
                    &schema_id,
                    &registration.artifact_id,
                    registration.global_id,
                )
                .await?;
            }
            Err(e) => {
                warn!(schema_id = %schema_id, error = %e, "Failed to sync schema to Apicurio");
                self.mark_schema_sync_failed(&schema_id, &e.to_string())
                    .await?;
            }
        }

        let model = config_schema::Entity::find_by_id(&schema_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("schema {} vanished after insert", schema_id))?;
        Ok(model)
    }

    async fn update_heartbeat(
        &self,
        service_id: &str,
    ) -> anyhow::Result<Option<service_module::Model>> {
        let tx = self.db.begin().await?;
        let Some(existing) = service_module::Entity::find_by_id(service_id).one(&tx).await? else {
            tx.commit().await?;
            return Ok(None);
        };

        let mut row: service_module::ActiveModel = existing.into();
        row.last_heartbeat = Set(Utc::now().naive_utc());
        row.status = Set(ServiceStatus::Active.as_str().to_string());
        let model = row.update(&tx).await?;
        tx.commit().await?;
        Ok(Some(model))
    }

    async fn mark_unhealthy(
        &self,
        service_id: &str,
    ) -> anyhow::Result<Option<service_module::Model>> {
        let tx = self.db.begin().await?;
        let Some(existing) = service_module::Entity::find_by_id(service_id).one(&tx).await? else {
            tx.commit().await?;
            return Ok(None);
        };

        let mut row: service_module::ActiveModel = existing.into();
        row.status = Set(ServiceStatus::Unhealthy.as_str().to_string());
        let model = row.update(&tx).await?;
        tx.commit().await?;
        Ok(Some(model))
    }

    async fn unregister_module(&self, service_id: &str) -> anyhow::Result<bool> {
        let tx = self.db.begin().await?;
        let result = service_module::Entity::delete_by_id(service_id)
            .exec(&tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected > 0)
    }

    async fn get_active_services(&self) -> anyhow::Result<Vec<service_module::Model>> {
        let services = service_module::Entity::find()
            .filter(service_module::Column::Status.eq(ServiceStatus::Active.as_str()))
            .all(&self.db)
            .await?;
        Ok(services)
    }

    async fn get_all_services(&self) -> anyhow::Result<Vec<service_module::Model>> {
        Ok(service_module::Entity::find().all(&self.db).await?)
    }

    async fn find_stale_services(&self) -> anyhow::Result<Vec<service_module::Model>> {
        let threshold = Utc::now().naive_utc() - chrono::Duration::seconds(STALE_AFTER_SECONDS);
        let services = service_module::Entity::find()
            .filter(service_module::Column::Status.eq(ServiceStatus::Active.as_str()))
            .filter(service_module::Column::LastHeartbeat.lt(threshold))
            .all(&self.db)
            .await?;
        Ok(services)
    }

    async fn find_by_id(
        &self,
        service_id: &str,
    ) -> anyhow::Result<Option<service_module::Model>> {
        Ok(service_module::Entity::find_by_id(service_id)
            .one(&self.db)
            .await?)
    }

    async fn find_schema_by_id(
        &self,
        schema_id: &str,
    ) -> anyhow::Result<Option<config_schema::Model>> {
        Ok(config_schema::Entity::find_by_id(schema_id)
            .one(&self.db)
            .await?)
    }

    async fn find_latest_schema_by_service_name(
        &self,
        service_name: &str,
    ) -> anyhow::Result<Option<config_schema::Model>> {
        let schema = config_schema::Entity::find()
            .filter(config_schema::Column::ServiceName.eq(service_name))
            .order_by_desc(config_schema::Column::CreatedAt)
            .one(&self.db)
            .await?;
        Ok(schema)
    }

    async fn find_schemas_needing_sync(&self) -> anyhow::Result<Vec<config_schema::Model>> {
        let schemas = config_schema::Entity::find()
            .filter(config_schema::Column::SyncStatus.is_in([
                SyncStatus::Pending.as_str(),
                SyncStatus::Failed.as_str(),
                SyncStatus::OutOfSync.as_str(),
            ]))
            .all(&self.db)
            .await?;
        Ok(schemas)
    }

    async fn count_services_by_status(&self) -> anyhow::Result<HashMap<ServiceStatus, u64>> {
        let mut counts = HashMap::new();
        for service in service_module::Entity::find().all(&self.db).await? {
            if let Some(status) = ServiceStatus::parse(&service.status) {
                *counts.entry(status).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn mark_schema_synced(
        &self,
        schema_id: &str,
        artifact_id: &str,
        global_id: i64,
    ) -> anyhow::Result<()> {
        let row = config_schema::ActiveModel {
            schema_id: Unchanged(schema_id.to_string()),
            apicurio_artifact_id: Set(Some(artifact_id.to_string())),
            apicurio_global_id: Set(Some(global_id)),
            sync_status: Set(SyncStatus::Synced.as_str().to_string()),
            last_sync_attempt: Set(Some(Utc::now().naive_utc())),
            sync_error: Set(None),
            ..Default::default()
        };
        row.update(&self.db).await?;
        Ok(())
    }

    async fn mark_schema_sync_failed(&self, schema_id: &str, error: &str) -> anyhow::Result<()> {
        let row = config_schema::ActiveModel {
            schema_id: Unchanged(schema_id.to_string()),
            sync_status: Set(SyncStatus::Failed.as_str().to_string()),
            last_sync_attempt: Set(Some(Utc::now().naive_utc())),
            sync_error: Set(Some(error.to_string())),
            ..Default::default()
        };
        row.update(&self.db).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_changed_detection() {
        let incoming = serde_json::json!({"owner": "data-team", "zone": "a"});

        assert!(SqlRegistryStore::metadata_changed(None, &incoming));
        assert!(SqlRegistryStore::metadata_changed(
            Some(r#"{"owner": "other"}"#),
            &incoming
        ));
        // Key order does not matter
        assert!(!SqlRegistryStore::metadata_changed(
            Some(r#"{"zone": "a", "owner": "data-team"}"#),
            &incoming
        ));
        assert!(SqlRegistryStore::metadata_changed(Some("not json"), &incoming));
        assert!(!SqlRegistryStore::metadata_changed(
            None,
            &serde_json::Value::Null
        ));
    }
}
