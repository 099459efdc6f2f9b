//! Registry store trait
//!
//! Defines the interface for the registration system of record. The store
//! exclusively owns writes to `modules` and `config_schemas`.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::entity::{config_schema, service_module};
use crate::model::ServiceStatus;

/// Registration persistence operations
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Idempotent upsert of a module and, when `json_schema` is non-empty,
    /// its configuration schema, in a single transaction. Always refreshes
    /// the heartbeat and sets status ACTIVE; mutable fields are only
    /// written when changed.
    async fn register_module(
        &self,
        service_name: &str,
        host: &str,
        port: i32,
        version: &str,
        metadata: serde_json::Value,
        json_schema: Option<&str>,
    ) -> anyhow::Result<service_module::Model>;

    /// Insert a schema and attempt to mirror it to the artifact registry.
    /// Mirror failure marks the row FAILED but never rolls back the insert.
    async fn save_schema(
        &self,
        service_name: &str,
        version: &str,
        json_schema: &str,
    ) -> anyhow::Result<config_schema::Model>;

    /// Refresh the heartbeat and reactivate, when the row exists.
    async fn update_heartbeat(
        &self,
        service_id: &str,
    ) -> anyhow::Result<Option<service_module::Model>>;

    /// Flag a module UNHEALTHY, when the row exists.
    async fn mark_unhealthy(
        &self,
        service_id: &str,
    ) -> anyhow::Result<Option<service_module::Model>>;

    /// Administrative deletion. Returns whether a row was removed.
    async fn unregister_module(&self, service_id: &str) -> anyhow::Result<bool>;

    async fn get_active_services(&self) -> anyhow::Result<Vec<service_module::Model>>;

    async fn get_all_services(&self) -> anyhow::Result<Vec<service_module::Model>>;

    /// ACTIVE modules whose heartbeat is older than 30 seconds.
    async fn find_stale_services(&self) -> anyhow::Result<Vec<service_module::Model>>;

    async fn find_by_id(&self, service_id: &str)
        -> anyhow::Result<Option<service_module::Model>>;

    async fn find_schema_by_id(
        &self,
        schema_id: &str,
    ) -> anyhow::Result<Option<config_schema::Model>>;

    /// Most recently created schema for a service.
    async fn find_latest_schema_by_service_name(
        &self,
        service_name: &str,
    ) -> anyhow::Result<Option<config_schema::Model>>;

    /// Schemas in PENDING, FAILED or OUT_OF_SYNC, for the sync reconciler.
    async fn find_schemas_needing_sync(&self) -> anyhow::Result<Vec<config_schema::Model>>;

    async fn count_services_by_status(&self) -> anyhow::Result<HashMap<ServiceStatus, u64>>;

    /// Record a successful registry mirror on a schema row.
    async fn mark_schema_synced(
        &self,
        schema_id: &str,
        artifact_id: &str,
        global_id: i64,
    ) -> anyhow::Result<()>;

    /// Record a failed registry mirror on a schema row.
    async fn mark_schema_sync_failed(&self, schema_id: &str, error: &str) -> anyhow::Result<()>;
}
