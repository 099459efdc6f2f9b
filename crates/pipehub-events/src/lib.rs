//! Kafka lifecycle-event publishing.
//!
//! Registration and unregistration outcomes stream to four topics for
//! downstream indexing. Payloads are protobuf-encoded; each record carries a
//! fresh random UUID key to spread partitions. Emission is fire-and-forget:
//! delivery failures are logged and never surfaced to the caller, and no
//! event is produced for failed registrations.

use std::time::Duration;

use prost::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pipehub_api::registration::v1::{
    ModuleRegistered, ModuleUnregistered, ServiceRegistered, ServiceUnregistered,
};

pub const SERVICE_REGISTERED_TOPIC: &str = "service-registered";
pub const SERVICE_UNREGISTERED_TOPIC: &str = "service-unregistered";
pub const MODULE_REGISTERED_TOPIC: &str = "module-registered";
pub const MODULE_UNREGISTERED_TOPIC: &str = "module-unregistered";

/// Configuration for the Kafka connection.
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Producer delivery timeout.
    pub message_timeout_ms: u32,
}

impl KafkaConfig {
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            message_timeout_ms: 5000,
        }
    }

    fn build_producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("message.timeout.ms", self.message_timeout_ms.to_string());
        config
    }
}

/// Sink for registration lifecycle events.
pub trait EventPublisher: Send + Sync {
    fn service_registered(&self, event: ServiceRegistered);
    fn service_unregistered(&self, event: ServiceUnregistered);
    fn module_registered(&self, event: ModuleRegistered);
    fn module_unregistered(&self, event: ModuleUnregistered);
}

/// Kafka implementation of [`EventPublisher`].
pub struct KafkaEventPublisher {
    producer: FutureProducer,
}

impl KafkaEventPublisher {
    pub fn new(config: KafkaConfig) -> anyhow::Result<Self> {
        let producer: FutureProducer = config
            .build_producer_config()
            .create()
            .map_err(|e| anyhow::anyhow!("Failed to create Kafka producer: {}", e))?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            "Connected to Kafka"
        );

        Ok(Self { producer })
    }

    fn emit(&self, topic: &'static str, service_id: String, payload: Vec<u8>) {
        let producer = self.producer.clone();
        let key = Uuid::new_v4().to_string();

        tokio::spawn(async move {
            let record = FutureRecord::to(topic).key(&key).payload(&payload);
            match producer.send(record, Duration::from_secs(5)).await {
                Ok(_) => {
                    debug!(topic = topic, service_id = %service_id, key = %key, "Emitted event")
                }
                Err((e, _)) => {
                    warn!(topic = topic, service_id = %service_id, error = %e, "Failed to emit event")
                }
            }
        });
    }
}

impl EventPublisher for KafkaEventPublisher {
    fn service_registered(&self, event: ServiceRegistered) {
        self.emit(
            SERVICE_REGISTERED_TOPIC,
            event.service_id.clone(),
            event.encode_to_vec(),
        );
    }

    fn service_unregistered(&self, event: ServiceUnregistered) {
        self.emit(
            SERVICE_UNREGISTERED_TOPIC,
            event.service_id.clone(),
            event.encode_to_vec(),
        );
    }

    fn module_registered(&self, event: ModuleRegistered) {
        self.emit(
            MODULE_REGISTERED_TOPIC,
            event.service_id.clone(),
            event.encode_to_vec(),
        );
    }

    fn module_unregistered(&self, event: ModuleUnregistered) {
        self.emit(
            MODULE_UNREGISTERED_TOPIC,
            event.service_id.clone(),
            event.encode_to_vec(),
        );
    }
}
