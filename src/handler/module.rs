//! Module registration orchestration.
//!
//! Extends the service registration state machine with metadata retrieval
//! from the module itself, schema selection, the transactional store write
//! and the best-effort artifact-registry mirror. Failures before the store
//! write compensate by deregistering from the discovery agent; once the
//! store row exists it is authoritative and nothing is compensated.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;
use tracing::{debug, error, info, warn};

use pipehub_api::module::v1::ServiceRegistrationMetadata;
use pipehub_api::now_timestamp;
use pipehub_api::registration::v1::{
    EventType, ModuleRegistered, ModuleRegistrationRequest, ModuleUnregistered,
    RegistrationEvent, ServiceRegistrationRequest, UnregisterRequest, UnregisterResponse,
};
use pipehub_apicurio::SchemaRegistryClient;
use pipehub_common::ids;
use pipehub_common::schema::synthesize_default_schema;
use pipehub_consul::{ConsulHealthChecker, DiscoveryClient};
use pipehub_events::EventPublisher;
use pipehub_persistence::RegistryStore;

use super::registration::{registration_spec, validate_service_request};
use super::{create_event, create_failed_event};
use crate::module_client::ModuleStubFactory;

type EventSender = mpsc::Sender<Result<RegistrationEvent, Status>>;

const MODULE_TAGS: [&str; 2] = ["module", "document-processor"];
const MODULE_CAPABILITY: &str = "PipeStepProcessor";

pub struct ModuleRegistrationHandler {
    discovery: Arc<dyn DiscoveryClient>,
    health: Arc<ConsulHealthChecker>,
    store: Arc<dyn RegistryStore>,
    registry: Arc<dyn SchemaRegistryClient>,
    stubs: Arc<dyn ModuleStubFactory>,
    events: Arc<dyn EventPublisher>,
}

impl ModuleRegistrationHandler {
    pub fn new(
        discovery: Arc<dyn DiscoveryClient>,
        health: Arc<ConsulHealthChecker>,
        store: Arc<dyn RegistryStore>,
        registry: Arc<dyn SchemaRegistryClient>,
        stubs: Arc<dyn ModuleStubFactory>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            discovery,
            health,
            store,
            registry,
            stubs,
            events,
        }
    }

    /// Register a module, streaming status updates.
    pub fn register_module(
        &self,
        request: ModuleRegistrationRequest,
    ) -> ReceiverStream<Result<RegistrationEvent, Status>> {
        let (tx, rx) = mpsc::channel(16);

        let discovery = self.discovery.clone();
        let health = self.health.clone();
        let store = self.store.clone();
        let registry = self.registry.clone();
        let stubs = self.stubs.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            run_module_registration(discovery, health, store, registry, stubs, events, request, tx)
                .await;
        });

        ReceiverStream::new(rx)
    }

    /// Unregister a module from the discovery agent, emitting the
    /// module-specific lifecycle event.
    pub async fn unregister_module(&self, request: UnregisterRequest) -> UnregisterResponse {
        let service_id = ids::service_id(&request.service_name, &request.host, request.port);
        let success = self.discovery.deregister(&service_id).await;

        let message = if success {
            self.events.module_unregistered(ModuleUnregistered {
                service_id: service_id.clone(),
                module_name: request.service_name.clone(),
                timestamp: Some(now_timestamp()),
            });
            "Module unregistered successfully"
        } else {
            "Failed to unregister module"
        };

        UnregisterResponse {
            success,
            message: message.to_string(),
            timestamp: Some(now_timestamp()),
        }
    }
}

/// Derive the discovery-agent registration from a module request: fixed
/// module tags and capability, embedded metadata flattened under
/// conventional keys.
pub(crate) fn convert_module_to_service(
    request: &ModuleRegistrationRequest,
) -> ServiceRegistrationRequest {
    let mut service = ServiceRegistrationRequest {
        service_name: request.module_name.clone(),
        host: request.host.clone(),
        port: request.port,
        version: request.version.clone(),
        tags: MODULE_TAGS.iter().map(|t| t.to_string()).collect(),
        metadata: request.metadata.clone(),
        capabilities: vec![MODULE_CAPABILITY.to_string()],
    };

    if let Some(metadata) = &request.service_registration_metadata {
        service
            .metadata
            .insert("module-name".to_string(), metadata.module_name.clone());
        service
            .metadata
            .insert("module-version".to_string(), metadata.version.clone());

        if let Some(schema) = &metadata.json_config_schema {
            service
                .metadata
                .insert("json-config-schema".to_string(), schema.clone());
        }
        if let Some(display_name) = &metadata.display_name {
            service
                .metadata
                .insert("display-name".to_string(), display_name.clone());
        }
        if let Some(description) = &metadata.description {
            service
                .metadata
                .insert("description".to_string(), description.clone());
        }

        service.tags.extend(metadata.tags.iter().cloned());
    }

    service
}

/// Use the module-provided schema when present, otherwise synthesize the
/// default key-value schema.
pub(crate) fn extract_or_synthesize_schema(
    metadata: &ServiceRegistrationMetadata,
    module_name: &str,
) -> String {
    match &metadata.json_config_schema {
        Some(schema) if !schema.trim().is_empty() => schema.clone(),
        _ => synthesize_default_schema(module_name),
    }
}

/// Flatten module metadata into the JSON document persisted with the row.
pub(crate) fn build_metadata_map(metadata: &ServiceRegistrationMetadata) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, value) in &metadata.metadata {
        map.insert(key.clone(), serde_json::Value::String(value.clone()));
    }

    if let Some(display_name) = &metadata.display_name {
        map.insert("display_name".to_string(), display_name.clone().into());
    }
    if let Some(description) = &metadata.description {
        map.insert("description".to_string(), description.clone().into());
    }
    if let Some(owner) = &metadata.owner {
        map.insert("owner".to_string(), owner.clone().into());
    }
    if let Some(documentation_url) = &metadata.documentation_url {
        map.insert(
            "documentation_url".to_string(),
            documentation_url.clone().into(),
        );
    }
    if !metadata.tags.is_empty() {
        map.insert("tags".to_string(), metadata.tags.clone().into());
    }
    if !metadata.dependencies.is_empty() {
        map.insert("dependencies".to_string(), metadata.dependencies.clone().into());
    }

    serde_json::Value::Object(map)
}

async fn emit(tx: &EventSender, event: RegistrationEvent) {
    let _ = tx.send(Ok(event)).await;
}

async fn compensate_consul(discovery: &Arc<dyn DiscoveryClient>, service_id: &str) {
    if discovery.deregister(service_id).await {
        info!(service_id = %service_id, "Rolled back Consul registration");
    } else {
        error!(service_id = %service_id, "Failed to rollback Consul registration");
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_module_registration(
    discovery: Arc<dyn DiscoveryClient>,
    health: Arc<ConsulHealthChecker>,
    store: Arc<dyn RegistryStore>,
    registry: Arc<dyn SchemaRegistryClient>,
    stubs: Arc<dyn ModuleStubFactory>,
    events: Arc<dyn EventPublisher>,
    request: ModuleRegistrationRequest,
    tx: EventSender,
) {
    let service_id = ids::service_id(&request.module_name, &request.host, request.port);

    emit(
        &tx,
        create_event(
            EventType::Started,
            "Starting module registration",
            Some(&service_id),
        ),
    )
    .await;

    let service_request = convert_module_to_service(&request);
    if !validate_service_request(&service_request) {
        emit(
            &tx,
            create_failed_event(
                Some(&service_id),
                "Invalid module registration request",
                "Missing required fields",
            ),
        )
        .await;
        return;
    }

    emit(
        &tx,
        create_event(
            EventType::Validated,
            "Module registration request validated",
            None,
        ),
    )
    .await;

    let spec = registration_spec(&service_request, &service_id);
    if !discovery.register(&spec).await {
        emit(
            &tx,
            create_failed_event(
                Some(&service_id),
                "Failed to register with Consul",
                "Consul registration failed",
            ),
        )
        .await;
        return;
    }

    emit(
        &tx,
        create_event(
            EventType::ConsulRegistered,
            "Module registered with Consul",
            Some(&service_id),
        ),
    )
    .await;
    emit(
        &tx,
        create_event(
            EventType::HealthCheckConfigured,
            "Health check configured",
            None,
        ),
    )
    .await;

    if !health.wait_for_healthy(&service_id).await {
        compensate_consul(&discovery, &service_id).await;
        emit(
            &tx,
            create_failed_event(
                Some(&service_id),
                "Module failed health checks",
                "Module did not become healthy within timeout period",
            ),
        )
        .await;
        return;
    }

    emit(
        &tx,
        create_event(
            EventType::ConsulHealthy,
            "Module reported healthy by Consul",
            None,
        ),
    )
    .await;

    // Pull the module's self-described metadata back over its own gRPC
    // surface
    let metadata = match fetch_module_metadata(&stubs, &request.module_name).await {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(module_name = %request.module_name, error = %e, "Failed to retrieve module metadata");
            compensate_consul(&discovery, &service_id).await;
            emit(
                &tx,
                create_failed_event(
                    Some(&service_id),
                    "Failed to retrieve module metadata",
                    &e.to_string(),
                ),
            )
            .await;
            return;
        }
    };

    emit(
        &tx,
        create_event(EventType::MetadataRetrieved, "Module metadata retrieved", None),
    )
    .await;

    let schema = extract_or_synthesize_schema(&metadata, &request.module_name);
    let metadata_map = build_metadata_map(&metadata);

    emit(
        &tx,
        create_event(
            EventType::SchemaValidated,
            "Schema validated or synthesized",
            None,
        ),
    )
    .await;

    // The transactional save runs on its own task so the session stays on
    // one execution context for the whole transaction
    let module = {
        let store = store.clone();
        let module_name = request.module_name.clone();
        let host = request.host.clone();
        let port = request.port;
        let version = request.version.clone();
        let schema = schema.clone();

        let save = tokio::spawn(async move {
            store
                .register_module(&module_name, &host, port, &version, metadata_map, Some(&schema))
                .await
        });

        match save.await {
            Ok(Ok(module)) => module,
            Ok(Err(e)) => {
                error!(service_id = %service_id, error = %e, "Failed to save module registration");
                emit(
                    &tx,
                    create_failed_event(
                        Some(&service_id),
                        "Failed to save module registration",
                        &e.to_string(),
                    ),
                )
                .await;
                return;
            }
            Err(e) => {
                error!(service_id = %service_id, error = %e, "Database save task failed");
                emit(
                    &tx,
                    create_failed_event(
                        Some(&service_id),
                        "Failed to save module registration",
                        &e.to_string(),
                    ),
                )
                .await;
                return;
            }
        }
    };

    emit(
        &tx,
        create_event(
            EventType::DatabaseSaved,
            "Module registration saved to database",
            Some(&module.service_id),
        ),
    )
    .await;

    // Mirror the schema to the artifact registry. The store is the system
    // of record, so a registry failure degrades the stream instead of
    // failing the registration.
    let artifact_id = match registry
        .create_or_update(&request.module_name, &request.version, &schema)
        .await
    {
        Ok(registration) => {
            emit(
                &tx,
                create_event(
                    EventType::ApicurioRegistered,
                    "Schema registered in Apicurio",
                    None,
                ),
            )
            .await;
            registration.artifact_id
        }
        Err(e) => {
            warn!(
                module_name = %request.module_name,
                version = %request.version,
                error = %e,
                "Apicurio registration failed, continuing without registry sync"
            );
            emit(
                &tx,
                create_event(
                    EventType::SchemaValidated,
                    "Apicurio registry sync skipped (failure)",
                    None,
                ),
            )
            .await;
            String::new()
        }
    };

    emit(
        &tx,
        create_event(
            EventType::Completed,
            "Module registration completed successfully",
            Some(&module.service_id),
        ),
    )
    .await;

    events.module_registered(ModuleRegistered {
        service_id: module.service_id.clone(),
        module_name: request.module_name.clone(),
        host: request.host.clone(),
        port: request.port,
        version: request.version.clone(),
        schema_id: module.config_schema_id.clone().unwrap_or_default(),
        artifact_id,
        timestamp: Some(now_timestamp()),
    });

    debug!(service_id = %module.service_id, "Module registration completed");
}

async fn fetch_module_metadata(
    stubs: &Arc<dyn ModuleStubFactory>,
    module_name: &str,
) -> anyhow::Result<ServiceRegistrationMetadata> {
    let stub = stubs.open_stub(module_name).await?;
    stub.get_service_registration().await
}
