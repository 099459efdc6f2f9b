//! Readiness of the hub's backing services.

pub mod readiness;

pub use readiness::{readiness_route, DependentServicesHealth};
