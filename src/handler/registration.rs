//! Service registration orchestration.
//!
//! Registration is a sequential state machine that streams one event per
//! completed stage. The stream never carries a transport error: every
//! failure path ends with a terminal FAILED event so callers can always
//! read the reason.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;
use tracing::{debug, error, info};

use pipehub_api::now_timestamp;
use pipehub_api::registration::v1::{
    EventType, RegistrationEvent, ServiceRegistered, ServiceRegistrationRequest,
    ServiceUnregistered, UnregisterRequest, UnregisterResponse,
};
use pipehub_common::ids;
use pipehub_consul::{ConsulHealthChecker, DiscoveryClient, RegistrationSpec};
use pipehub_events::EventPublisher;

use super::{create_event, create_failed_event};

type EventSender = mpsc::Sender<Result<RegistrationEvent, Status>>;

pub struct ServiceRegistrationHandler {
    discovery: Arc<dyn DiscoveryClient>,
    health: Arc<ConsulHealthChecker>,
    events: Arc<dyn EventPublisher>,
}

impl ServiceRegistrationHandler {
    pub fn new(
        discovery: Arc<dyn DiscoveryClient>,
        health: Arc<ConsulHealthChecker>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            discovery,
            health,
            events,
        }
    }

    /// Register a service, streaming status updates.
    pub fn register_service(
        &self,
        request: ServiceRegistrationRequest,
    ) -> ReceiverStream<Result<RegistrationEvent, Status>> {
        let (tx, rx) = mpsc::channel(16);

        let discovery = self.discovery.clone();
        let health = self.health.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            run_service_registration(discovery, health, events, request, tx).await;
        });

        ReceiverStream::new(rx)
    }

    /// Unregister a service from the discovery agent. The store row is not
    /// touched; row deletion is an administrative operation.
    pub async fn unregister_service(&self, request: UnregisterRequest) -> UnregisterResponse {
        let service_id = ids::service_id(&request.service_name, &request.host, request.port);
        let success = self.discovery.deregister(&service_id).await;

        let message = if success {
            self.events.service_unregistered(ServiceUnregistered {
                service_id: service_id.clone(),
                service_name: request.service_name.clone(),
                timestamp: Some(now_timestamp()),
            });
            "Service unregistered successfully"
        } else {
            "Failed to unregister service"
        };

        UnregisterResponse {
            success,
            message: message.to_string(),
            timestamp: Some(now_timestamp()),
        }
    }
}

pub(crate) fn validate_service_request(request: &ServiceRegistrationRequest) -> bool {
    !request.service_name.is_empty() && !request.host.is_empty() && request.port > 0
}

pub(crate) fn registration_spec(
    request: &ServiceRegistrationRequest,
    service_id: &str,
) -> RegistrationSpec {
    RegistrationSpec {
        service_id: service_id.to_string(),
        service_name: request.service_name.clone(),
        host: request.host.clone(),
        port: request.port,
        version: request.version.clone(),
        tags: request.tags.clone(),
        metadata: request.metadata.clone(),
        capabilities: request.capabilities.clone(),
    }
}

async fn emit(tx: &EventSender, event: RegistrationEvent) {
    // A failed send means the client went away; the remaining stages still
    // run so compensation is not skipped
    let _ = tx.send(Ok(event)).await;
}

async fn run_service_registration(
    discovery: Arc<dyn DiscoveryClient>,
    health: Arc<ConsulHealthChecker>,
    events: Arc<dyn EventPublisher>,
    request: ServiceRegistrationRequest,
    tx: EventSender,
) {
    let service_id = ids::service_id(&request.service_name, &request.host, request.port);

    emit(
        &tx,
        create_event(
            EventType::Started,
            "Starting service registration",
            Some(&service_id),
        ),
    )
    .await;

    if !validate_service_request(&request) {
        emit(
            &tx,
            create_failed_event(
                Some(&service_id),
                "Invalid service registration request",
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
            "Service registration request validated",
            None,
        ),
    )
    .await;

    let spec = registration_spec(&request, &service_id);
    if !discovery.register(&spec).await {
        emit(
            &tx,
            create_failed_event(
                Some(&service_id),
                "Failed to register with Consul",
                "Consul registration returned false",
            ),
        )
        .await;
        return;
    }

    emit(
        &tx,
        create_event(
            EventType::ConsulRegistered,
            "Service registered with Consul",
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

    if health.wait_for_healthy(&service_id).await {
        emit(
            &tx,
            create_event(
                EventType::ConsulHealthy,
                "Service reported healthy by Consul",
                None,
            ),
        )
        .await;
        emit(
            &tx,
            create_event(
                EventType::Completed,
                "Service registration completed successfully",
                Some(&service_id),
            ),
        )
        .await;

        events.service_registered(ServiceRegistered {
            service_id: service_id.clone(),
            service_name: request.service_name.clone(),
            host: request.host.clone(),
            port: request.port,
            version: request.version.clone(),
            timestamp: Some(now_timestamp()),
        });
        info!(service_id = %service_id, "Service registration completed");
    } else {
        // Registered but never became healthy; take the registration back
        // out of the agent before reporting failure
        if discovery.deregister(&service_id).await {
            debug!(service_id = %service_id, "Cleaned up unhealthy service registration");
        } else {
            error!(service_id = %service_id, "Failed to clean up unhealthy service registration");
        }

        emit(
            &tx,
            create_failed_event(
                Some(&service_id),
                "Service registered but failed health checks",
                "Service did not become healthy within timeout period. Check service logs and connectivity.",
            ),
        )
        .await;
    }
}
