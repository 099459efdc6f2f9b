//! Layered schema retrieval.
//!
//! Lookup order: relational store (system of record), then the artifact
//! registry, then a direct call to the module itself. Only when all three
//! come up empty does the caller see NOT_FOUND.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use pipehub_api::now_timestamp;
use pipehub_api::registration::v1::ModuleSchemaResponse;
use pipehub_apicurio::{ArtifactMetadata, SchemaRegistryClient};
use pipehub_common::ids;
use pipehub_common::schema::synthesize_default_schema;
use pipehub_common::PipehubError;
use pipehub_persistence::entity::config_schema;
use pipehub_persistence::RegistryStore;

use crate::module_client::ModuleStubFactory;

pub struct SchemaRetrievalHandler {
    store: Arc<dyn RegistryStore>,
    registry: Arc<dyn SchemaRegistryClient>,
    stubs: Arc<dyn ModuleStubFactory>,
}

impl SchemaRetrievalHandler {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        registry: Arc<dyn SchemaRegistryClient>,
        stubs: Arc<dyn ModuleStubFactory>,
    ) -> Self {
        Self {
            store,
            registry,
            stubs,
        }
    }

    pub async fn get_module_schema(
        &self,
        module_name: &str,
        version: Option<&str>,
    ) -> Result<ModuleSchemaResponse, PipehubError> {
        let version = version.filter(|v| !v.is_empty());
        info!(
            module_name = %module_name,
            version = version.unwrap_or("latest"),
            "Retrieving schema for module"
        );

        match self.schema_from_store(module_name, version).await {
            Ok(Some(schema)) => return Ok(response_from_store(schema)),
            Ok(None) => {
                debug!(module_name = %module_name, "Schema not found in database, trying Apicurio")
            }
            Err(e) => {
                warn!(module_name = %module_name, error = %e, "Database schema lookup failed")
            }
        }

        match self.schema_from_registry(module_name, version).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(
                    module_name = %module_name,
                    error = %e,
                    "Failed to get schema from Apicurio, falling back to module"
                );
                self.schema_from_module(module_name).await
            }
        }
    }

    async fn schema_from_store(
        &self,
        module_name: &str,
        version: Option<&str>,
    ) -> anyhow::Result<Option<config_schema::Model>> {
        match version {
            Some(version) => {
                let schema_id = ids::schema_id(module_name, version);
                self.store.find_schema_by_id(&schema_id).await
            }
            None => {
                self.store
                    .find_latest_schema_by_service_name(module_name)
                    .await
            }
        }
    }

    async fn schema_from_registry(
        &self,
        module_name: &str,
        version: Option<&str>,
    ) -> anyhow::Result<ModuleSchemaResponse> {
        let version_to_fetch = version.unwrap_or("latest");
        let content = self.registry.get_schema(module_name, version_to_fetch).await?;
        let metadata = self.registry.get_artifact_metadata(module_name).await?;
        Ok(response_from_registry(
            module_name,
            content,
            version_to_fetch,
            metadata,
        ))
    }

    /// Last resort: ask the module itself for its registration metadata.
    async fn schema_from_module(
        &self,
        module_name: &str,
    ) -> Result<ModuleSchemaResponse, PipehubError> {
        info!(module_name = %module_name, "Falling back to direct module call for schema");

        let metadata = match self.stubs.open_stub(module_name).await {
            Ok(stub) => stub.get_service_registration().await,
            Err(e) => Err(e),
        };

        match metadata {
            Ok(metadata) => {
                let mut response_metadata = HashMap::new();
                response_metadata.insert("source".to_string(), "module-direct".to_string());
                if let Some(display_name) = &metadata.display_name {
                    response_metadata.insert("display_name".to_string(), display_name.clone());
                }
                if let Some(description) = &metadata.description {
                    response_metadata.insert("description".to_string(), description.clone());
                }
                if let Some(owner) = &metadata.owner {
                    response_metadata.insert("owner".to_string(), owner.clone());
                }

                let schema_json = match &metadata.json_config_schema {
                    Some(schema) if !schema.trim().is_empty() => schema.clone(),
                    _ => synthesize_default_schema(module_name),
                };
                let schema_version = if metadata.version.trim().is_empty() {
                    "unknown".to_string()
                } else {
                    metadata.version.clone()
                };

                Ok(ModuleSchemaResponse {
                    module_name: module_name.to_string(),
                    schema_json,
                    schema_version,
                    artifact_id: None,
                    metadata: response_metadata,
                    updated_at: Some(now_timestamp()),
                })
            }
            Err(e) => {
                warn!(module_name = %module_name, error = %e, "Failed to get schema from module");
                Err(PipehubError::NotFound(format!(
                    "Module schema not found: {}. Module may not be running or registered.",
                    module_name
                )))
            }
        }
    }
}

fn response_from_store(schema: config_schema::Model) -> ModuleSchemaResponse {
    let mut metadata = HashMap::new();
    metadata.insert("sync_status".to_string(), schema.sync_status.clone());
    if let Some(created_by) = &schema.created_by {
        metadata.insert("created_by".to_string(), created_by.clone());
    }

    ModuleSchemaResponse {
        module_name: schema.service_name,
        schema_json: schema.json_schema,
        schema_version: schema.schema_version,
        artifact_id: schema.apicurio_artifact_id,
        metadata,
        updated_at: Some(prost_types::Timestamp {
            seconds: schema.created_at.and_utc().timestamp(),
            nanos: schema.created_at.and_utc().timestamp_subsec_nanos() as i32,
        }),
    }
}

fn response_from_registry(
    module_name: &str,
    content: String,
    version: &str,
    artifact: Option<ArtifactMetadata>,
) -> ModuleSchemaResponse {
    let mut metadata = HashMap::new();
    let mut artifact_id = None;

    if let Some(artifact) = artifact {
        if !artifact.artifact_id.is_empty() {
            artifact_id = Some(artifact.artifact_id);
        }
        if let Some(owner) = artifact.owner {
            metadata.insert("owner".to_string(), owner);
        }
        if let Some(name) = artifact.name {
            metadata.insert("name".to_string(), name);
        }
        if let Some(description) = artifact.description {
            metadata.insert("description".to_string(), description);
        }
        if let Some(modified_on) = artifact.modified_on {
            metadata.insert("modified_on".to_string(), modified_on);
        }
    }

    ModuleSchemaResponse {
        module_name: module_name.to_string(),
        schema_json: content,
        schema_version: version.to_string(),
        artifact_id,
        metadata,
        updated_at: Some(now_timestamp()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_response_from_store_carries_sync_status() {
        let schema = config_schema::Model {
            schema_id: "splitter-v1_0_0".to_string(),
            service_name: "splitter".to_string(),
            schema_version: "1.0.0".to_string(),
            json_schema: "{}".to_string(),
            created_at: Utc::now().naive_utc(),
            created_by: Some("registrar".to_string()),
            apicurio_artifact_id: Some("splitter-config-v1_0_0".to_string()),
            apicurio_global_id: Some(7),
            sync_status: "SYNCED".to_string(),
            last_sync_attempt: None,
            sync_error: None,
        };

        let response = response_from_store(schema);
        assert_eq!(response.module_name, "splitter");
        assert_eq!(response.metadata.get("sync_status").unwrap(), "SYNCED");
        assert_eq!(response.metadata.get("created_by").unwrap(), "registrar");
        assert_eq!(
            response.artifact_id.as_deref(),
            Some("splitter-config-v1_0_0")
        );
    }

    #[test]
    fn test_response_from_registry_flattens_artifact_metadata() {
        let artifact = ArtifactMetadata {
            artifact_id: "splitter-config".to_string(),
            name: Some("Splitter config".to_string()),
            description: None,
            owner: Some("data-team".to_string()),
            modified_on: None,
        };

        let response =
            response_from_registry("splitter", "{}".to_string(), "latest", Some(artifact));
        assert_eq!(response.artifact_id.as_deref(), Some("splitter-config"));
        assert_eq!(response.metadata.get("owner").unwrap(), "data-team");
        assert_eq!(response.schema_version, "latest");
    }
}
