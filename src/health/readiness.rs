//! Aggregate readiness check for the services the hub depends on.
//!
//! Probed backends:
//! - the relational store (`SELECT 1` on the shared pool)
//! - the discovery agent (agent info)
//! - the schema registry (system info)
//!
//! Overall status is UP only when all three respond within two seconds.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, HttpResponse};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use serde::Serialize;
use tokio::time::timeout;

use pipehub_apicurio::SchemaRegistryClient;
use pipehub_consul::DiscoveryClient;

const PROBE_DEADLINE: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackendStatus {
    fn up(detail: &str) -> Self {
        Self {
            status: "UP",
            detail: Some(detail.to_string()),
            error: None,
        }
    }

    fn down(error: String) -> Self {
        Self {
            status: "DOWN",
            detail: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReadinessReport {
    pub status: &'static str,
    pub checks: BTreeMap<&'static str, BackendStatus>,
}

impl ReadinessReport {
    pub fn is_up(&self) -> bool {
        self.status == "UP"
    }
}

pub struct DependentServicesHealth {
    db: DatabaseConnection,
    discovery: Arc<dyn DiscoveryClient>,
    registry: Arc<dyn SchemaRegistryClient>,
}

impl DependentServicesHealth {
    pub fn new(
        db: DatabaseConnection,
        discovery: Arc<dyn DiscoveryClient>,
        registry: Arc<dyn SchemaRegistryClient>,
    ) -> Self {
        Self {
            db,
            discovery,
            registry,
        }
    }

    pub async fn check(&self) -> ReadinessReport {
        let mut checks = BTreeMap::new();

        checks.insert("database", self.check_database().await);
        checks.insert("consul", self.check_consul().await);
        checks.insert("apicurio", self.check_apicurio().await);

        let status = if checks.values().all(|c| c.status == "UP") {
            "UP"
        } else {
            "DOWN"
        };

        ReadinessReport { status, checks }
    }

    async fn check_database(&self) -> BackendStatus {
        match timeout(PROBE_DEADLINE, self.db.execute_unprepared("SELECT 1")).await {
            Ok(Ok(_)) => BackendStatus::up("Service registry database is accessible"),
            Ok(Err(e)) => BackendStatus::down(e.to_string()),
            Err(_) => BackendStatus::down("timed out".to_string()),
        }
    }

    async fn check_consul(&self) -> BackendStatus {
        match timeout(PROBE_DEADLINE, self.discovery.agent_info()).await {
            Ok(Ok(())) => BackendStatus::up("Connected to Consul agent"),
            Ok(Err(e)) => BackendStatus::down(format!("Failed to connect to Consul: {}", e)),
            Err(_) => BackendStatus::down("timed out".to_string()),
        }
    }

    async fn check_apicurio(&self) -> BackendStatus {
        match timeout(PROBE_DEADLINE, self.registry.is_healthy()).await {
            Ok(true) => BackendStatus::up("Schema registry is accessible"),
            Ok(false) => BackendStatus::down("Schema registry health check failed".to_string()),
            Err(_) => BackendStatus::down("timed out".to_string()),
        }
    }
}

/// GET /health/ready
pub async fn readiness_route(health: web::Data<DependentServicesHealth>) -> HttpResponse {
    let report = health.check().await;
    if report.is_up() {
        HttpResponse::Ok().json(report)
    } else {
        HttpResponse::ServiceUnavailable().json(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serialization_omits_empty_fields() {
        let mut checks = BTreeMap::new();
        checks.insert("consul", BackendStatus::up("Connected to Consul agent"));
        checks.insert("database", BackendStatus::down("timed out".to_string()));

        let report = ReadinessReport {
            status: "DOWN",
            checks,
        };
        assert!(!report.is_up());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "DOWN");
        assert_eq!(json["checks"]["consul"]["status"], "UP");
        assert!(json["checks"]["consul"].get("error").is_none());
        assert_eq!(json["checks"]["database"]["error"], "timed out");
    }
}
