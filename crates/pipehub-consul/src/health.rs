//! Health convergence against the discovery agent.
//!
//! After an instance is registered, the agent needs several check intervals
//! before it reports the instance as passing. The checker polls until the
//! instance shows up healthy or the attempt budget is exhausted.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use pipehub_common::ids::extract_service_name;

use crate::client::DiscoveryClient;

const MAX_HEALTH_CHECK_ATTEMPTS: u32 = 10;
const BASE_DELAY_SECONDS: u64 = 3;
const MAX_DELAY_SECONDS: u64 = 10;

/// Polls the discovery agent until a freshly registered instance is
/// reported healthy.
pub struct ConsulHealthChecker {
    discovery: Arc<dyn DiscoveryClient>,
}

impl ConsulHealthChecker {
    pub fn new(discovery: Arc<dyn DiscoveryClient>) -> Self {
        Self { discovery }
    }

    /// Wait for `service_id` to appear among the healthy nodes of its
    /// service. Returns `true` on the first observation, `false` after the
    /// attempt budget is spent or when the id is malformed.
    pub async fn wait_for_healthy(&self, service_id: &str) -> bool {
        let Some(service_name) = extract_service_name(service_id) else {
            error!(service_id = %service_id, "Invalid serviceId format");
            return false;
        };

        debug!(
            service_id = %service_id,
            service_name = %service_name,
            "Waiting for health check"
        );

        for attempt in 0..MAX_HEALTH_CHECK_ATTEMPTS {
            match self.discovery.healthy_nodes(service_name).await {
                Ok(instances) => {
                    if instances.iter().any(|i| i.service_id == service_id) {
                        info!(service_id = %service_id, "Service is now healthy in Consul");
                        return true;
                    }
                    debug!(
                        service_id = %service_id,
                        attempt = attempt + 1,
                        max = MAX_HEALTH_CHECK_ATTEMPTS,
                        "Service not healthy yet"
                    );
                }
                Err(e) => {
                    warn!(
                        service_id = %service_id,
                        error = %e,
                        "Error checking health; treating as not yet healthy"
                    );
                }
            }

            let delay = (BASE_DELAY_SECONDS + attempt as u64).min(MAX_DELAY_SECONDS);
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }

        warn!(
            service_id = %service_id,
            attempts = MAX_HEALTH_CHECK_ATTEMPTS,
            "Service did not become healthy"
        );
        false
    }
}
