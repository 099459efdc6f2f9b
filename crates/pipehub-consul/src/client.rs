//! Discovery agent client.
//!
//! Thin wrapper over the Consul agent HTTP API. Registration and
//! deregistration never raise: failures are logged and reported as `false`
//! so callers can emit a typed failure instead of a transport error.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::model::{
    AgentServiceCheck, AgentServiceRegistration, ServiceEntry, ServiceInstance,
};

const HEALTH_CHECK_INTERVAL: &str = "10s";
const DEREGISTER_AFTER: &str = "1m";

/// Instance coordinates handed to [`DiscoveryClient::register`].
#[derive(Debug, Clone, Default)]
pub struct RegistrationSpec {
    pub service_id: String,
    pub service_name: String,
    pub host: String,
    pub port: i32,
    pub version: String,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub capabilities: Vec<String>,
}

/// Operations against the external discovery agent.
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Register an instance with a gRPC health check. Returns `false` on
    /// any failure.
    async fn register(&self, spec: &RegistrationSpec) -> bool;

    /// Remove an instance. Returns `false` on any failure.
    async fn deregister(&self, service_id: &str) -> bool;

    /// Instances of `service_name` whose health checks are passing.
    async fn healthy_nodes(&self, service_name: &str) -> anyhow::Result<Vec<ServiceInstance>>;

    /// Reachability probe against the agent itself.
    async fn agent_info(&self) -> anyhow::Result<()>;

    /// Names of all services known to the agent catalog.
    async fn catalog_services(&self) -> anyhow::Result<Vec<String>>;
}

/// Consul implementation of [`DiscoveryClient`].
pub struct ConsulClient {
    base_url: String,
    client: reqwest::Client,
}

impl ConsulClient {
    pub fn new(host: &str, port: u16) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url: format!("http://{}:{}/v1", host, port),
            client,
        })
    }

    fn build_registration(spec: &RegistrationSpec) -> AgentServiceRegistration {
        let mut tags = spec.tags.clone();
        // Capabilities surface as prefixed tags so plain agents can filter
        // on them
        for capability in &spec.capabilities {
            tags.push(format!("capability:{}", capability));
        }

        let mut meta = spec.metadata.clone();
        meta.insert("version".to_string(), spec.version.clone());

        AgentServiceRegistration {
            id: spec.service_id.clone(),
            name: spec.service_name.clone(),
            address: spec.host.clone(),
            port: spec.port,
            tags,
            meta,
            check: Some(AgentServiceCheck {
                name: format!("{} gRPC Health Check", spec.service_name),
                grpc: format!("{}:{}", spec.host, spec.port),
                interval: HEALTH_CHECK_INTERVAL.to_string(),
                deregister_critical_service_after: DEREGISTER_AFTER.to_string(),
            }),
        }
    }
}

#[async_trait]
impl DiscoveryClient for ConsulClient {
    async fn register(&self, spec: &RegistrationSpec) -> bool {
        let registration = Self::build_registration(spec);
        info!(service_id = %spec.service_id, "Registering service with Consul");

        let result = self
            .client
            .put(format!("{}/agent/service/register", self.base_url))
            .json(&registration)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => {
                info!(service_id = %spec.service_id, "Successfully registered service");
                true
            }
            Err(e) => {
                error!(service_id = %spec.service_id, error = %e, "Failed to register service");
                false
            }
        }
    }

    async fn deregister(&self, service_id: &str) -> bool {
        info!(service_id = %service_id, "Unregistering service from Consul");

        let result = self
            .client
            .put(format!(
                "{}/agent/service/deregister/{}",
                self.base_url, service_id
            ))
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => {
                info!(service_id = %service_id, "Successfully unregistered service");
                true
            }
            Err(e) => {
                error!(service_id = %service_id, error = %e, "Failed to unregister service");
                false
            }
        }
    }

    async fn healthy_nodes(&self, service_name: &str) -> anyhow::Result<Vec<ServiceInstance>> {
        let entries: Vec<ServiceEntry> = self
            .client
            .get(format!("{}/health/service/{}", self.base_url, service_name))
            .query(&[("passing", "true")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(
            service_name = %service_name,
            count = entries.len(),
            "Queried healthy nodes"
        );

        Ok(entries.into_iter().map(ServiceInstance::from).collect())
    }

    async fn agent_info(&self) -> anyhow::Result<()> {
        self.client
            .get(format!("{}/agent/self", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn catalog_services(&self) -> anyhow::Result<Vec<String>> {
        let services: HashMap<String, Vec<String>> = self
            .client
            .get(format!("{}/catalog/services", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(services.into_keys().collect())
    }
}
