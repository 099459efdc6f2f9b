//! gRPC service implementations.

pub mod grpc;

pub use grpc::PlatformRegistrationService;
