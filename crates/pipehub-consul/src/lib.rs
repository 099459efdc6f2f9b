//! Consul integration for PipeHub.
//!
//! This crate provides:
//! - [`client::DiscoveryClient`]: the discovery-agent seam
//! - [`client::ConsulClient`]: the Consul HTTP implementation
//! - [`health::ConsulHealthChecker`]: post-registration health convergence

pub mod client;
pub mod health;
pub mod model;

pub use client::{ConsulClient, DiscoveryClient, RegistrationSpec};
pub use health::ConsulHealthChecker;
pub use model::ServiceInstance;
