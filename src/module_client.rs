//! Dynamic client for calling a registered module back.
//!
//! The orchestrator needs to invoke `GetServiceRegistration` on the module
//! it is registering. The factory resolves the module's address through the
//! discovery agent and dials a fresh channel; the trait pair keeps the
//! transport pluggable.

use std::sync::Arc;

use async_trait::async_trait;
use tonic::transport::Channel;
use tracing::debug;

use pipehub_api::module::v1::pipe_step_processor_client::PipeStepProcessorClient;
use pipehub_api::module::v1::{RegistrationRequest, ServiceRegistrationMetadata};
use pipehub_consul::DiscoveryClient;

/// A connected client for one module instance.
#[async_trait]
pub trait ModuleStub: Send + Sync {
    async fn get_service_registration(&self) -> anyhow::Result<ServiceRegistrationMetadata>;
}

/// Opens stubs to modules by name.
#[async_trait]
pub trait ModuleStubFactory: Send + Sync {
    async fn open_stub(&self, module_name: &str) -> anyhow::Result<Box<dyn ModuleStub>>;
}

/// Factory that resolves module addresses through the discovery agent.
pub struct GrpcModuleStubFactory {
    discovery: Arc<dyn DiscoveryClient>,
}

impl GrpcModuleStubFactory {
    pub fn new(discovery: Arc<dyn DiscoveryClient>) -> Self {
        Self { discovery }
    }
}

#[async_trait]
impl ModuleStubFactory for GrpcModuleStubFactory {
    async fn open_stub(&self, module_name: &str) -> anyhow::Result<Box<dyn ModuleStub>> {
        let instances = self.discovery.healthy_nodes(module_name).await?;
        let instance = instances
            .first()
            .ok_or_else(|| anyhow::anyhow!("no healthy instance for module {}", module_name))?;

        let endpoint = format!("http://{}:{}", instance.address, instance.port);
        debug!(module_name = %module_name, endpoint = %endpoint, "Dialing module");

        let client = PipeStepProcessorClient::connect(endpoint).await?;
        Ok(Box::new(GrpcModuleStub { client }))
    }
}

struct GrpcModuleStub {
    client: PipeStepProcessorClient<Channel>,
}

#[async_trait]
impl ModuleStub for GrpcModuleStub {
    async fn get_service_registration(&self) -> anyhow::Result<ServiceRegistrationMetadata> {
        let mut client = self.client.clone();
        let response = client
            .get_service_registration(RegistrationRequest {})
            .await?;
        Ok(response.into_inner())
    }
}
