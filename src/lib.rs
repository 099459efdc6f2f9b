//! PipeHub - service registration and discovery hub for the PipeStream
//! platform.
//!
//! The hub mediates between four external authorities: the relational
//! store (system of record), the Consul discovery agent (liveness), the
//! Apicurio schema registry (configuration schemas by artifact) and Kafka
//! (lifecycle events for downstream indexing).

// Module declarations
pub mod handler; // Registration, discovery and schema handlers
pub mod health; // Readiness of backing services
pub mod module_client; // Dynamic stubs for calling modules back
pub mod service; // gRPC service implementations
pub mod settings; // Application settings
pub mod startup; // Logging, server spawning, self-registration
