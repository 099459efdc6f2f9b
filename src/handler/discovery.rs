//! Service discovery and lookup over the discovery agent's view.
//!
//! All queries fan out through the agent; the store is not consulted here.
//! List operations degrade per-name failures to empty lists so one broken
//! service cannot take down the whole listing.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;
use tracing::{debug, error, info};

use pipehub_api::now_timestamp;
use pipehub_api::registration::v1::{
    ModuleDetails, ModuleListResponse, ServiceDetails, ServiceListResponse,
    ServiceResolveRequest, ServiceResolveResponse,
};
use pipehub_common::ids::extract_service_name;
use pipehub_common::PipehubError;
use pipehub_consul::{DiscoveryClient, ServiceInstance};

const MODULE_TAG: &str = "module";
const CAPABILITY_PREFIX: &str = "capability:";
const WATCH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct ServiceDiscoveryHandler {
    discovery: Arc<dyn DiscoveryClient>,
}

impl ServiceDiscoveryHandler {
    pub fn new(discovery: Arc<dyn DiscoveryClient>) -> Self {
        Self { discovery }
    }

    /// List all healthy non-module services.
    pub async fn list_services(&self) -> ServiceListResponse {
        let services: Vec<ServiceDetails> = self
            .healthy_instances()
            .await
            .into_iter()
            .filter(|instance| !is_module(&instance.tags))
            .map(to_service_details)
            .collect();

        ServiceListResponse {
            total_count: services.len() as i32,
            services,
            as_of: Some(now_timestamp()),
        }
    }

    /// List all healthy modules.
    pub async fn list_modules(&self) -> ModuleListResponse {
        let modules: Vec<ModuleDetails> = self
            .healthy_instances()
            .await
            .into_iter()
            .filter(|instance| is_module(&instance.tags))
            .map(to_module_details)
            .collect();

        ModuleListResponse {
            total_count: modules.len() as i32,
            modules,
            as_of: Some(now_timestamp()),
        }
    }

    /// First healthy instance of a service.
    pub async fn get_service_by_name(
        &self,
        service_name: &str,
    ) -> Result<ServiceDetails, PipehubError> {
        let instances = self
            .discovery
            .healthy_nodes(service_name)
            .await
            .map_err(|e| PipehubError::DiscoveryError(e.to_string()))?;

        instances
            .into_iter()
            .next()
            .map(to_service_details)
            .ok_or_else(|| PipehubError::NotFound(format!("Service not found: {}", service_name)))
    }

    /// Exact instance lookup by id.
    pub async fn get_service_by_id(
        &self,
        service_id: &str,
    ) -> Result<ServiceDetails, PipehubError> {
        let service_name = extract_service_name(service_id).ok_or_else(|| {
            PipehubError::IllegalArgument(format!("Invalid service ID format: {}", service_id))
        })?;

        let instances = self
            .discovery
            .healthy_nodes(service_name)
            .await
            .map_err(|e| PipehubError::DiscoveryError(e.to_string()))?;

        instances
            .into_iter()
            .find(|instance| instance.service_id == service_id)
            .map(to_service_details)
            .ok_or_else(|| {
                PipehubError::NotFound(format!("Service instance not found: {}", service_id))
            })
    }

    /// First healthy instance tagged as a module.
    pub async fn get_module_by_name(
        &self,
        module_name: &str,
    ) -> Result<ModuleDetails, PipehubError> {
        let instances = self
            .discovery
            .healthy_nodes(module_name)
            .await
            .map_err(|e| PipehubError::DiscoveryError(e.to_string()))?;

        instances
            .into_iter()
            .find(|instance| is_module(&instance.tags))
            .map(to_module_details)
            .ok_or_else(|| PipehubError::NotFound(format!("Module not found: {}", module_name)))
    }

    /// Exact module instance lookup by id.
    pub async fn get_module_by_id(&self, module_id: &str) -> Result<ModuleDetails, PipehubError> {
        let module_name = extract_service_name(module_id).ok_or_else(|| {
            PipehubError::IllegalArgument(format!("Invalid module ID format: {}", module_id))
        })?;

        let instances = self
            .discovery
            .healthy_nodes(module_name)
            .await
            .map_err(|e| PipehubError::DiscoveryError(e.to_string()))?;

        instances
            .into_iter()
            .find(|instance| instance.service_id == module_id && is_module(&instance.tags))
            .map(to_module_details)
            .ok_or_else(|| {
                PipehubError::NotFound(format!("Module instance not found: {}", module_id))
            })
    }

    /// Pick the best available instance under the request's constraints.
    /// Never fails: errors and misses come back as `found = false` with a
    /// selection reason.
    pub async fn resolve_service(&self, request: ServiceResolveRequest) -> ServiceResolveResponse {
        let base = ServiceResolveResponse {
            service_name: request.service_name.clone(),
            resolved_at: Some(now_timestamp()),
            ..Default::default()
        };

        let instances = match self.discovery.healthy_nodes(&request.service_name).await {
            Ok(instances) => instances,
            Err(e) => {
                error!(service_name = %request.service_name, error = %e, "Failed to resolve service");
                return ServiceResolveResponse {
                    selection_reason: format!("Error resolving service: {}", e),
                    ..base
                };
            }
        };

        if instances.is_empty() {
            return ServiceResolveResponse {
                selection_reason: "No healthy instances found".to_string(),
                ..base
            };
        }

        let candidates = filter_instances(
            &instances,
            &request.required_tags,
            &request.required_capabilities,
        );

        if candidates.is_empty() {
            return ServiceResolveResponse {
                total_instances: instances.len() as i32,
                healthy_instances: instances.len() as i32,
                selection_reason: "No instances match the required criteria".to_string(),
                ..base
            };
        }

        let (selected, selection_reason) = select_instance(&candidates, request.prefer_local);
        let (tags, capabilities) = split_capability_tags(&selected.tags);

        ServiceResolveResponse {
            found: true,
            host: selected.address.clone(),
            port: selected.port,
            service_id: selected.service_id.clone(),
            version: selected.meta.get("version").cloned().unwrap_or_default(),
            metadata: selected.meta.clone(),
            tags,
            capabilities,
            total_instances: instances.len() as i32,
            healthy_instances: candidates.len() as i32,
            selection_reason: selection_reason.to_string(),
            ..base
        }
    }

    /// Stream the full service list: one immediate snapshot, then one every
    /// two seconds until the client cancels.
    pub fn watch_services(&self) -> ReceiverStream<Result<ServiceListResponse, Status>> {
        info!("Starting service watch stream");
        let handler = self.clone();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(WATCH_INTERVAL);
            loop {
                ticker.tick().await;
                let snapshot = handler.list_services().await;
                debug!(count = snapshot.total_count, "Service watch update");
                if tx.send(Ok(snapshot)).await.is_err() {
                    info!("Service watch stream cancelled by client");
                    break;
                }
            }
        });

        ReceiverStream::new(rx)
    }

    /// Stream the full module list on the same cadence as
    /// [`Self::watch_services`].
    pub fn watch_modules(&self) -> ReceiverStream<Result<ModuleListResponse, Status>> {
        info!("Starting module watch stream");
        let handler = self.clone();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(WATCH_INTERVAL);
            loop {
                ticker.tick().await;
                let snapshot = handler.list_modules().await;
                debug!(count = snapshot.total_count, "Module watch update");
                if tx.send(Ok(snapshot)).await.is_err() {
                    info!("Module watch stream cancelled by client");
                    break;
                }
            }
        });

        ReceiverStream::new(rx)
    }

    /// All healthy instances across the catalog. Per-name query failures
    /// degrade to empty lists; a catalog failure degrades to an empty
    /// overall result.
    async fn healthy_instances(&self) -> Vec<ServiceInstance> {
        let names = match self.discovery.catalog_services().await {
            Ok(names) => names,
            Err(e) => {
                error!(error = %e, "Failed to list services from Consul");
                return Vec::new();
            }
        };

        let queries = names.iter().map(|name| {
            let discovery = self.discovery.clone();
            async move { discovery.healthy_nodes(name).await.unwrap_or_default() }
        });

        join_all(queries).await.into_iter().flatten().collect()
    }
}

fn is_module(tags: &[String]) -> bool {
    tags.iter().any(|tag| tag == MODULE_TAG)
}

/// Split raw agent tags into plain tags and capability names.
fn split_capability_tags(tags: &[String]) -> (Vec<String>, Vec<String>) {
    let mut plain = Vec::new();
    let mut capabilities = Vec::new();
    for tag in tags {
        match tag.strip_prefix(CAPABILITY_PREFIX) {
            Some(capability) => capabilities.push(capability.to_string()),
            None => plain.push(tag.clone()),
        }
    }
    (plain, capabilities)
}

/// Keep instances satisfying tag and capability containment.
fn filter_instances<'a>(
    instances: &'a [ServiceInstance],
    required_tags: &[String],
    required_capabilities: &[String],
) -> Vec<&'a ServiceInstance> {
    instances
        .iter()
        .filter(|instance| required_tags.iter().all(|tag| instance.tags.contains(tag)))
        .filter(|instance| {
            required_capabilities.iter().all(|capability| {
                instance
                    .tags
                    .iter()
                    .filter_map(|tag| tag.strip_prefix(CAPABILITY_PREFIX))
                    .any(|c| c == capability)
            })
        })
        .collect()
}

/// Local instance when requested and available, otherwise the first
/// candidate.
fn select_instance<'a>(
    candidates: &[&'a ServiceInstance],
    prefer_local: bool,
) -> (&'a ServiceInstance, &'static str) {
    if prefer_local {
        if let Some(local) = candidates
            .iter()
            .find(|instance| instance.address == "localhost" || instance.address == "127.0.0.1")
        {
            return (*local, "Selected local instance as requested");
        }
    }
    (candidates[0], "Selected first available healthy instance")
}

fn to_service_details(instance: ServiceInstance) -> ServiceDetails {
    let (tags, capabilities) = split_capability_tags(&instance.tags);
    let version = instance.meta.get("version").cloned().unwrap_or_default();

    ServiceDetails {
        service_id: instance.service_id,
        service_name: instance.service_name,
        host: instance.address,
        port: instance.port,
        version,
        metadata: instance.meta,
        tags,
        capabilities,
        // Only passing instances come back from the agent
        is_healthy: true,
        registered_at: Some(now_timestamp()),
        last_health_check: Some(now_timestamp()),
    }
}

fn to_module_details(instance: ServiceInstance) -> ModuleDetails {
    let (tags, capabilities) = split_capability_tags(&instance.tags);
    let version = instance.meta.get("version").cloned().unwrap_or_default();
    let input_format = instance.meta.get("input-format").cloned().unwrap_or_default();
    let output_format = instance
        .meta
        .get("output-format")
        .cloned()
        .unwrap_or_default();

    ModuleDetails {
        service_id: instance.service_id,
        module_name: instance.service_name,
        host: instance.address,
        port: instance.port,
        version,
        metadata: instance.meta,
        tags,
        capabilities,
        is_healthy: true,
        input_format,
        output_format,
        registered_at: Some(now_timestamp()),
        last_health_check: Some(now_timestamp()),
    }
}
