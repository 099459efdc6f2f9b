//! Shared in-process doubles for the handler integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use pipehub_api::module::v1::ServiceRegistrationMetadata;
use pipehub_api::registration::v1::{
    ModuleRegistered, ModuleUnregistered, RegistrationEvent, ServiceRegistered,
    ServiceUnregistered,
};
use pipehub_apicurio::{
    ArtifactMetadata, SchemaRegistration, SchemaRegistryClient, SearchedArtifact,
};
use pipehub_common::ids;
use pipehub_consul::{DiscoveryClient, RegistrationSpec, ServiceInstance};
use pipehub_events::EventPublisher;
use pipehub_persistence::entity::{config_schema, service_module};
use pipehub_persistence::{RegistryStore, ServiceStatus, SyncStatus};
use pipehub::module_client::{ModuleStub, ModuleStubFactory};

// ---------------------------------------------------------------------------
// Discovery double
// ---------------------------------------------------------------------------

pub struct MockDiscovery {
    pub register_ok: bool,
    pub deregister_ok: bool,
    pub registrations: Mutex<Vec<RegistrationSpec>>,
    pub deregistrations: Mutex<Vec<String>>,
    /// Scripted healthy-node responses, consumed one per query; when empty
    /// the default response is returned
    pub healthy_script: Mutex<VecDeque<anyhow::Result<Vec<ServiceInstance>>>>,
    pub healthy_default: Mutex<Vec<ServiceInstance>>,
    pub healthy_queries: Mutex<Vec<String>>,
    pub catalog: Mutex<anyhow::Result<Vec<String>>>,
}

impl MockDiscovery {
    pub fn new() -> Self {
        Self {
            register_ok: true,
            deregister_ok: true,
            registrations: Mutex::new(Vec::new()),
            deregistrations: Mutex::new(Vec::new()),
            healthy_script: Mutex::new(VecDeque::new()),
            healthy_default: Mutex::new(Vec::new()),
            healthy_queries: Mutex::new(Vec::new()),
            catalog: Mutex::new(Ok(Vec::new())),
        }
    }

    pub fn with_register_failure() -> Self {
        Self {
            register_ok: false,
            ..Self::new()
        }
    }

    pub fn push_healthy(&self, response: anyhow::Result<Vec<ServiceInstance>>) {
        self.healthy_script.lock().unwrap().push_back(response);
    }

    pub fn set_default_healthy(&self, instances: Vec<ServiceInstance>) {
        *self.healthy_default.lock().unwrap() = instances;
    }

    pub fn set_catalog(&self, catalog: anyhow::Result<Vec<String>>) {
        *self.catalog.lock().unwrap() = catalog;
    }

    pub fn deregistered_ids(&self) -> Vec<String> {
        self.deregistrations.lock().unwrap().clone()
    }
}

#[async_trait]
impl DiscoveryClient for MockDiscovery {
    async fn register(&self, spec: &RegistrationSpec) -> bool {
        self.registrations.lock().unwrap().push(spec.clone());
        self.register_ok
    }

    async fn deregister(&self, service_id: &str) -> bool {
        self.deregistrations
            .lock()
            .unwrap()
            .push(service_id.to_string());
        self.deregister_ok
    }

    async fn healthy_nodes(&self, service_name: &str) -> anyhow::Result<Vec<ServiceInstance>> {
        self.healthy_queries
            .lock()
            .unwrap()
            .push(service_name.to_string());

        if let Some(scripted) = self.healthy_script.lock().unwrap().pop_front() {
            return scripted;
        }
        Ok(self.healthy_default.lock().unwrap().clone())
    }

    async fn agent_info(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn catalog_services(&self) -> anyhow::Result<Vec<String>> {
        match &*self.catalog.lock().unwrap() {
            Ok(names) => Ok(names.clone()),
            Err(e) => Err(anyhow::anyhow!("{}", e)),
        }
    }
}

pub fn instance(service_name: &str, address: &str, port: i32, tags: &[&str]) -> ServiceInstance {
    ServiceInstance {
        service_id: ids::service_id(service_name, address, port),
        service_name: service_name.to_string(),
        address: address.to_string(),
        port,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        meta: HashMap::new(),
    }
}

// ---------------------------------------------------------------------------
// Schema registry double
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockRegistry {
    pub fail: bool,
    pub create_calls: Mutex<Vec<(String, String)>>,
    pub schema_content: Mutex<Option<String>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_schema(content: &str) -> Self {
        Self {
            schema_content: Mutex::new(Some(content.to_string())),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SchemaRegistryClient for MockRegistry {
    async fn create_or_update(
        &self,
        service_name: &str,
        version: &str,
        _json_schema: &str,
    ) -> anyhow::Result<SchemaRegistration> {
        self.create_calls
            .lock()
            .unwrap()
            .push((service_name.to_string(), version.to_string()));

        if self.fail {
            anyhow::bail!("registry unavailable");
        }

        Ok(SchemaRegistration {
            artifact_id: ids::versioned_artifact_id(service_name, version),
            global_id: 1,
            version: version.to_string(),
        })
    }

    async fn get_schema(&self, _service_name: &str, _version: &str) -> anyhow::Result<String> {
        match &*self.schema_content.lock().unwrap() {
            Some(content) if !self.fail => Ok(content.clone()),
            _ => anyhow::bail!("artifact not found"),
        }
    }

    async fn get_artifact_metadata(
        &self,
        service_name: &str,
    ) -> anyhow::Result<Option<ArtifactMetadata>> {
        Ok(Some(ArtifactMetadata {
            artifact_id: ids::base_artifact_id(service_name),
            name: None,
            description: None,
            owner: None,
            modified_on: None,
        }))
    }

    async fn list_artifacts(&self) -> anyhow::Result<Vec<SearchedArtifact>> {
        Ok(Vec::new())
    }

    async fn delete_artifact(&self, _service_name: &str) -> bool {
        !self.fail
    }

    async fn is_healthy(&self) -> bool {
        !self.fail
    }
}

// ---------------------------------------------------------------------------
// In-memory registry store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    pub fail_register: bool,
    pub modules: Mutex<HashMap<String, service_module::Model>>,
    pub schemas: Mutex<HashMap<String, config_schema::Model>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_register: true,
            ..Self::default()
        }
    }

    pub fn insert_schema(&self, schema: config_schema::Model) {
        self.schemas
            .lock()
            .unwrap()
            .insert(schema.schema_id.clone(), schema);
    }

    pub fn schema(&self, schema_id: &str) -> Option<config_schema::Model> {
        self.schemas.lock().unwrap().get(schema_id).cloned()
    }

    pub fn module_count(&self) -> usize {
        self.modules.lock().unwrap().len()
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn register_module(
        &self,
        service_name: &str,
        host: &str,
        port: i32,
        version: &str,
        metadata: serde_json::Value,
        json_schema: Option<&str>,
    ) -> anyhow::Result<service_module::Model> {
        if self.fail_register {
            anyhow::bail!("database unavailable");
        }

        let service_id = ids::service_id(service_name, host, port);
        let now = Utc::now().naive_utc();

        let schema_id = match json_schema.filter(|s| !s.trim().is_empty()) {
            Some(schema) => {
                let schema_id = ids::schema_id(service_name, version);
                self.schemas
                    .lock()
                    .unwrap()
                    .entry(schema_id.clone())
                    .or_insert_with(|| config_schema::Model {
                        schema_id: schema_id.clone(),
                        service_name: service_name.to_string(),
                        schema_version: version.to_string(),
                        json_schema: schema.to_string(),
                        created_at: now,
                        created_by: None,
                        apicurio_artifact_id: None,
                        apicurio_global_id: None,
                        sync_status: SyncStatus::Pending.as_str().to_string(),
                        last_sync_attempt: None,
                        sync_error: None,
                    });
                Some(schema_id)
            }
            None => None,
        };

        let mut modules = self.modules.lock().unwrap();
        let model = modules
            .entry(service_id.clone())
            .and_modify(|m| {
                m.version = Some(version.to_string());
                m.last_heartbeat = now;
                m.status = ServiceStatus::Active.as_str().to_string();
            })
            .or_insert_with(|| service_module::Model {
                service_id: service_id.clone(),
                service_name: service_name.to_string(),
                host: host.to_string(),
                port,
                version: Some(version.to_string()),
                config_schema_id: schema_id.clone(),
                metadata: Some(metadata.to_string()),
                registered_at: now,
                last_heartbeat: now,
                status: ServiceStatus::Active.as_str().to_string(),
            })
            .clone();

        Ok(model)
    }

    async fn save_schema(
        &self,
        service_name: &str,
        version: &str,
        json_schema: &str,
    ) -> anyhow::Result<config_schema::Model> {
        let schema_id = ids::schema_id(service_name, version);
        let schema = config_schema::Model {
            schema_id: schema_id.clone(),
            service_name: service_name.to_string(),
            schema_version: version.to_string(),
            json_schema: json_schema.to_string(),
            created_at: Utc::now().naive_utc(),
            created_by: None,
            apicurio_artifact_id: None,
            apicurio_global_id: None,
            sync_status: SyncStatus::Pending.as_str().to_string(),
            last_sync_attempt: None,
            sync_error: None,
        };
        self.insert_schema(schema.clone());
        Ok(schema)
    }

    async fn update_heartbeat(
        &self,
        service_id: &str,
    ) -> anyhow::Result<Option<service_module::Model>> {
        let mut modules = self.modules.lock().unwrap();
        Ok(modules.get_mut(service_id).map(|m| {
            m.last_heartbeat = Utc::now().naive_utc();
            m.status = ServiceStatus::Active.as_str().to_string();
            m.clone()
        }))
    }

    async fn mark_unhealthy(
        &self,
        service_id: &str,
    ) -> anyhow::Result<Option<service_module::Model>> {
        let mut modules = self.modules.lock().unwrap();
        Ok(modules.get_mut(service_id).map(|m| {
            m.status = ServiceStatus::Unhealthy.as_str().to_string();
            m.clone()
        }))
    }

    async fn unregister_module(&self, service_id: &str) -> anyhow::Result<bool> {
        Ok(self.modules.lock().unwrap().remove(service_id).is_some())
    }

    async fn get_active_services(&self) -> anyhow::Result<Vec<service_module::Model>> {
        Ok(self
            .modules
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.status == ServiceStatus::Active.as_str())
            .cloned()
            .collect())
    }

    async fn get_all_services(&self) -> anyhow::Result<Vec<service_module::Model>> {
        Ok(self.modules.lock().unwrap().values().cloned().collect())
    }

    async fn find_stale_services(&self) -> anyhow::Result<Vec<service_module::Model>> {
        let threshold = Utc::now().naive_utc() - chrono::Duration::seconds(30);
        Ok(self
            .modules
            .lock()
            .unwrap()
            .values()
            .filter(|m| {
                m.status == ServiceStatus::Active.as_str() && m.last_heartbeat < threshold
            })
            .cloned()
            .collect())
    }

    async fn find_by_id(
        &self,
        service_id: &str,
    ) -> anyhow::Result<Option<service_module::Model>> {
        Ok(self.modules.lock().unwrap().get(service_id).cloned())
    }

    async fn find_schema_by_id(
        &self,
        schema_id: &str,
    ) -> anyhow::Result<Option<config_schema::Model>> {
        Ok(self.schemas.lock().unwrap().get(schema_id).cloned())
    }

    async fn find_latest_schema_by_service_name(
        &self,
        service_name: &str,
    ) -> anyhow::Result<Option<config_schema::Model>> {
        Ok(self
            .schemas
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.service_name == service_name)
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn find_schemas_needing_sync(&self) -> anyhow::Result<Vec<config_schema::Model>> {
        Ok(self
            .schemas
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.sync_status != SyncStatus::Synced.as_str())
            .cloned()
            .collect())
    }

    async fn count_services_by_status(&self) -> anyhow::Result<HashMap<ServiceStatus, u64>> {
        let mut counts = HashMap::new();
        for module in self.modules.lock().unwrap().values() {
            if let Some(status) = ServiceStatus::parse(&module.status) {
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
        if let Some(schema) = self.schemas.lock().unwrap().get_mut(schema_id) {
            schema.apicurio_artifact_id = Some(artifact_id.to_string());
            schema.apicurio_global_id = Some(global_id);
            schema.sync_status = SyncStatus::Synced.as_str().to_string();
        }
        Ok(())
    }

    async fn mark_schema_sync_failed(&self, schema_id: &str, error: &str) -> anyhow::Result<()> {
        if let Some(schema) = self.schemas.lock().unwrap().get_mut(schema_id) {
            schema.sync_status = SyncStatus::Failed.as_str().to_string();
            schema.sync_error = Some(error.to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Event publisher recorder
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingEvents {
    pub services_registered: Mutex<Vec<ServiceRegistered>>,
    pub services_unregistered: Mutex<Vec<ServiceUnregistered>>,
    pub modules_registered: Mutex<Vec<ModuleRegistered>>,
    pub modules_unregistered: Mutex<Vec<ModuleUnregistered>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> usize {
        self.services_registered.lock().unwrap().len()
            + self.services_unregistered.lock().unwrap().len()
            + self.modules_registered.lock().unwrap().len()
            + self.modules_unregistered.lock().unwrap().len()
    }
}

impl EventPublisher for RecordingEvents {
    fn service_registered(&self, event: ServiceRegistered) {
        self.services_registered.lock().unwrap().push(event);
    }

    fn service_unregistered(&self, event: ServiceUnregistered) {
        self.services_unregistered.lock().unwrap().push(event);
    }

    fn module_registered(&self, event: ModuleRegistered) {
        self.modules_registered.lock().unwrap().push(event);
    }

    fn module_unregistered(&self, event: ModuleUnregistered) {
        self.modules_unregistered.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// Module stub double
// ---------------------------------------------------------------------------

pub struct StaticStubFactory {
    metadata: Option<ServiceRegistrationMetadata>,
}

impl StaticStubFactory {
    pub fn returning(metadata: ServiceRegistrationMetadata) -> Self {
        Self {
            metadata: Some(metadata),
        }
    }

    pub fn unreachable() -> Self {
        Self { metadata: None }
    }
}

#[async_trait]
impl ModuleStubFactory for StaticStubFactory {
    async fn open_stub(&self, module_name: &str) -> anyhow::Result<Box<dyn ModuleStub>> {
        match &self.metadata {
            Some(metadata) => Ok(Box::new(StaticStub {
                metadata: metadata.clone(),
            })),
            None => anyhow::bail!("module {} is unreachable", module_name),
        }
    }
}

struct StaticStub {
    metadata: ServiceRegistrationMetadata,
}

#[async_trait]
impl ModuleStub for StaticStub {
    async fn get_service_registration(&self) -> anyhow::Result<ServiceRegistrationMetadata> {
        Ok(self.metadata.clone())
    }
}

// ---------------------------------------------------------------------------
// Stream helpers
// ---------------------------------------------------------------------------

/// Drain a registration stream to completion.
pub async fn collect_events(
    mut stream: tokio_stream::wrappers::ReceiverStream<
        Result<RegistrationEvent, tonic::Status>,
    >,
) -> Vec<RegistrationEvent> {
    use tokio_stream::StreamExt;

    let mut events = Vec::new();
    while let Some(result) = stream.next().await {
        events.push(result.expect("registration streams never carry transport errors"));
    }
    events
}

pub fn event_types(
    events: &[RegistrationEvent],
) -> Vec<pipehub_api::registration::v1::EventType> {
    events.iter().map(|e| e.event_type()).collect()
}
