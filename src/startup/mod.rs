//! Process startup: logging, server spawning, self-registration.

pub mod grpc;
pub mod logging;
pub mod self_register;
