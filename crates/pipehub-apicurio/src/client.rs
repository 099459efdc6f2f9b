//! Apicurio Registry v3 client.
//!
//! Secondary storage for configuration schemas (the relational store is the
//! system of record). The transport is blocking, so every call runs on the
//! tokio blocking pool rather than the async I/O threads.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info};

use pipehub_common::ids::{base_artifact_id, versioned_artifact_id};

use crate::model::{
    ArtifactMetadata, ArtifactSearchResults, CreateArtifact, CreateArtifactResponse,
    CreateVersion, SchemaRegistration, SearchedArtifact, VersionContent,
};

const DEFAULT_GROUP: &str = "ai.pipestream.schemas";
const LIST_LIMIT: u32 = 500;

/// Operations against the external schema registry.
#[async_trait]
pub trait SchemaRegistryClient: Send + Sync {
    /// Create or update a schema artifact. Idempotent: the same content for
    /// the same `(artifactId, version)` resolves to the existing version.
    async fn create_or_update(
        &self,
        service_name: &str,
        version: &str,
        json_schema: &str,
    ) -> anyhow::Result<SchemaRegistration>;

    /// Fetch schema content; version `"latest"` resolves the highest one.
    async fn get_schema(&self, service_name: &str, version: &str) -> anyhow::Result<String>;

    /// Artifact-level metadata, `None` when the artifact does not exist.
    async fn get_artifact_metadata(
        &self,
        service_name: &str,
    ) -> anyhow::Result<Option<ArtifactMetadata>>;

    /// All artifacts in the group, for reconciliation.
    async fn list_artifacts(&self) -> anyhow::Result<Vec<SearchedArtifact>>;

    /// Delete an artifact. Returns `false` on failure.
    async fn delete_artifact(&self, service_name: &str) -> bool;

    /// Readiness probe via the system-info endpoint.
    async fn is_healthy(&self) -> bool;
}

/// HTTP implementation of [`SchemaRegistryClient`].
pub struct ApicurioClient {
    base_url: String,
    group: String,
    client: reqwest::blocking::Client,
}

impl ApicurioClient {
    pub fn new(registry_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()?;

        info!(url = %registry_url, "Apicurio Registry v3 client initialized");

        Ok(Self {
            base_url: format!("{}/apis/registry/v3", registry_url.trim_end_matches('/')),
            group: DEFAULT_GROUP.to_string(),
            client,
        })
    }

    fn artifacts_url(&self) -> String {
        format!("{}/groups/{}/artifacts", self.base_url, self.group)
    }
}

#[async_trait]
impl SchemaRegistryClient for ApicurioClient {
    async fn create_or_update(
        &self,
        service_name: &str,
        version: &str,
        json_schema: &str,
    ) -> anyhow::Result<SchemaRegistration> {
        let artifact_id = versioned_artifact_id(service_name, version);
        let url = self.artifacts_url();
        let client = self.client.clone();
        let body = CreateArtifact {
            artifact_id: artifact_id.clone(),
            artifact_type: "JSON".to_string(),
            first_version: CreateVersion {
                version: if version.trim().is_empty() {
                    "1".to_string()
                } else {
                    version.to_string()
                },
                content: VersionContent {
                    content: json_schema.to_string(),
                    content_type: "application/json".to_string(),
                },
            },
        };
        let service_name = service_name.to_string();
        let version = version.to_string();

        let response: CreateArtifactResponse = tokio::task::spawn_blocking(move || {
            client
                .post(&url)
                .query(&[("ifExists", "FIND_OR_CREATE_VERSION")])
                .json(&body)
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.json())
        })
        .await?
        .map_err(|e| {
            error!(
                service_name = %service_name,
                version = %version,
                artifact_id = %artifact_id,
                error = %e,
                "Failed to register schema"
            );
            anyhow::anyhow!("Failed to register schema: {}", e)
        })?;

        info!(
            service_name = %service_name,
            version = %version,
            global_id = response.version.global_id,
            "Successfully registered schema"
        );

        Ok(SchemaRegistration {
            artifact_id,
            global_id: response.version.global_id,
            version: response.version.version,
        })
    }

    async fn get_schema(&self, service_name: &str, version: &str) -> anyhow::Result<String> {
        // "latest" is a version expression, not part of the artifact id
        let (artifact_id, version_expr) = if version.is_empty() || version == "latest" {
            (
                versioned_artifact_id(service_name, ""),
                "latest".to_string(),
            )
        } else {
            (
                versioned_artifact_id(service_name, version),
                version.to_string(),
            )
        };
        let url = format!(
            "{}/{}/versions/{}/content",
            self.artifacts_url(),
            artifact_id,
            version_expr
        );
        let client = self.client.clone();
        let service_name = service_name.to_string();

        tokio::task::spawn_blocking(move || {
            client
                .get(&url)
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.text())
        })
        .await?
        .map_err(|e| {
            error!(service_name = %service_name, error = %e, "Failed to get schema");
            anyhow::anyhow!("Failed to get schema: {}", e)
        })
    }

    async fn get_artifact_metadata(
        &self,
        service_name: &str,
    ) -> anyhow::Result<Option<ArtifactMetadata>> {
        let artifact_id = base_artifact_id(service_name);
        let url = format!("{}/{}", self.artifacts_url(), artifact_id);
        let client = self.client.clone();

        let result = tokio::task::spawn_blocking(move || {
            client
                .get(&url)
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.json::<ArtifactMetadata>())
        })
        .await?;

        match result {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) => {
                debug!(artifact_id = %artifact_id, error = %e, "No artifact metadata");
                Ok(None)
            }
        }
    }

    async fn list_artifacts(&self) -> anyhow::Result<Vec<SearchedArtifact>> {
        let url = format!("{}/search/artifacts", self.base_url);
        let group = self.group.clone();
        let client = self.client.clone();

        let results: ArtifactSearchResults = tokio::task::spawn_blocking(move || {
            client
                .get(&url)
                .query(&[
                    ("groupId", group.as_str()),
                    ("limit", &LIST_LIMIT.to_string()),
                    ("offset", "0"),
                ])
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.json())
        })
        .await??;

        Ok(results.artifacts)
    }

    async fn delete_artifact(&self, service_name: &str) -> bool {
        let artifact_id = base_artifact_id(service_name);
        let url = format!("{}/{}", self.artifacts_url(), artifact_id);
        let client = self.client.clone();

        let result = tokio::task::spawn_blocking(move || {
            client
                .delete(&url)
                .send()
                .and_then(|r| r.error_for_status())
        })
        .await;

        match result {
            Ok(Ok(_)) => {
                info!(artifact_id = %artifact_id, "Successfully deleted artifact");
                true
            }
            Ok(Err(e)) => {
                error!(artifact_id = %artifact_id, error = %e, "Failed to delete artifact");
                false
            }
            Err(e) => {
                error!(artifact_id = %artifact_id, error = %e, "Delete task failed");
                false
            }
        }
    }

    async fn is_healthy(&self) -> bool {
        let url = format!("{}/system/info", self.base_url);
        let client = self.client.clone();

        let result = tokio::task::spawn_blocking(move || {
            client.get(&url).send().and_then(|r| r.error_for_status())
        })
        .await;

        match result {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(error = %e, "Health check failed");
                false
            }
            Err(_) => false,
        }
    }
}
