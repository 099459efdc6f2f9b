//! Self-registration of the hub with the discovery agent.
//!
//! Bypasses the gRPC client (which would be a circular dependency) and
//! drives the local registration handler directly, logging every streamed
//! event.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_stream::StreamExt;
use tracing::{debug, error, info};

use pipehub_api::registration::v1::{EventType, ServiceRegistrationRequest};

use crate::handler::registration::ServiceRegistrationHandler;
use crate::settings::{parse_csv, RegistrationSettings};

pub fn self_register(
    handler: Arc<ServiceRegistrationHandler>,
    settings: &RegistrationSettings,
    version: &str,
) {
    if !settings.enabled {
        info!("Service registration disabled");
        return;
    }

    let service_name = settings.service_name.clone();
    info!(service_name = %service_name, "Self-registering with Consul (local handler)");

    let request = build_service_request(settings, version);
    let mut stream = handler.register_service(request);

    tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            let Ok(event) = result else { break };
            info!(
                event_type = ?event.event_type(),
                message = %event.message,
                "Self-registration event"
            );

            match event.event_type() {
                EventType::Completed => {
                    info!(service_name = %service_name, "Successfully self-registered with Consul");
                }
                EventType::Failed => {
                    error!(
                        service_name = %service_name,
                        message = %event.message,
                        detail = event.error_detail.as_deref().unwrap_or(""),
                        "Failed to self-register"
                    );
                }
                _ => {}
            }
        }
        debug!("Self-registration stream completed");
    });
}

fn build_service_request(
    settings: &RegistrationSettings,
    version: &str,
) -> ServiceRegistrationRequest {
    let mut metadata = HashMap::new();
    metadata.insert("description".to_string(), settings.description.clone());
    metadata.insert("service-type".to_string(), settings.service_type.clone());

    ServiceRegistrationRequest {
        service_name: settings.service_name.clone(),
        host: determine_host(settings),
        port: settings.port,
        version: version.to_string(),
        tags: parse_csv(&settings.tags),
        metadata,
        capabilities: parse_csv(&settings.capabilities),
    }
}

fn determine_host(settings: &RegistrationSettings) -> String {
    // Environment override wins over configuration
    match std::env::var("PIPEHUB_REGISTRATION_HOST") {
        Ok(host) if !host.is_empty() => {
            info!(host = %host, "Using PIPEHUB_REGISTRATION_HOST from environment");
            host
        }
        _ => {
            info!(host = %settings.host, "Using configured service host");
            settings.host.clone()
        }
    }
}
