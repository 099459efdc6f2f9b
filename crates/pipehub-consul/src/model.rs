// Consul Agent API data models
// Field names match the Consul HTTP API specification

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Service registration request
/// PUT /v1/agent/service/register
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Address")]
    pub address: String,

    #[serde(rename = "Port")]
    pub port: i32,

    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,

    #[serde(rename = "Meta", default)]
    pub meta: HashMap<String, String>,

    #[serde(rename = "Check", default, skip_serializing_if = "Option::is_none")]
    pub check: Option<AgentServiceCheck>,
}

/// Health check definition attached to a service registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentServiceCheck {
    #[serde(rename = "Name")]
    pub name: String,

    /// gRPC health endpoint in `host:port` form
    #[serde(rename = "GRPC")]
    pub grpc: String,

    #[serde(rename = "Interval")]
    pub interval: String,

    #[serde(rename = "DeregisterCriticalServiceAfter")]
    pub deregister_critical_service_after: String,
}

/// Service block inside a health query entry
/// GET /v1/health/service/{name}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentService {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Service")]
    pub service: String,

    #[serde(rename = "Address", default)]
    pub address: String,

    #[serde(rename = "Port", default)]
    pub port: i32,

    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,

    #[serde(rename = "Meta", default)]
    pub meta: HashMap<String, String>,
}

/// One entry of a health query response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    #[serde(rename = "Service")]
    pub service: AgentService,
}

/// A healthy service instance as seen by the discovery agent.
///
/// This is the flattened view the rest of the system works with; the raw
/// Consul wire shapes stay inside this crate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceInstance {
    pub service_id: String,
    pub service_name: String,
    pub address: String,
    pub port: i32,
    pub tags: Vec<String>,
    pub meta: HashMap<String, String>,
}

impl From<ServiceEntry> for ServiceInstance {
    fn from(entry: ServiceEntry) -> Self {
        let service = entry.service;
        ServiceInstance {
            service_id: service.id,
            service_name: service.service,
            address: service.address,
            port: service.port,
            tags: service.tags,
            meta: service.meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_serializes_consul_field_names() {
        let registration = AgentServiceRegistration {
            id: "orders-10-0-0-4-9090".to_string(),
            name: "orders".to_string(),
            address: "10.0.0.4".to_string(),
            port: 9090,
            tags: vec!["api".to_string()],
            meta: HashMap::new(),
            check: Some(AgentServiceCheck {
                name: "orders gRPC Health Check".to_string(),
                grpc: "10.0.0.4:9090".to_string(),
                interval: "10s".to_string(),
                deregister_critical_service_after: "1m".to_string(),
            }),
        };

        let json = serde_json::to_value(&registration).unwrap();
        assert_eq!(json["ID"], "orders-10-0-0-4-9090");
        assert_eq!(json["Check"]["GRPC"], "10.0.0.4:9090");
        assert_eq!(json["Check"]["DeregisterCriticalServiceAfter"], "1m");
    }

    #[test]
    fn test_health_entry_deserializes() {
        let body = r#"[{
            "Node": {"Node": "agent-1"},
            "Service": {
                "ID": "orders-10-0-0-4-9090",
                "Service": "orders",
                "Address": "10.0.0.4",
                "Port": 9090,
                "Tags": ["api", "capability:search"],
                "Meta": {"version": "1.2.0"}
            },
            "Checks": []
        }]"#;

        let entries: Vec<ServiceEntry> = serde_json::from_str(body).unwrap();
        let instance = ServiceInstance::from(entries[0].clone());
        assert_eq!(instance.service_id, "orders-10-0-0-4-9090");
        assert_eq!(instance.meta.get("version").unwrap(), "1.2.0");
        assert_eq!(instance.tags.len(), 2);
    }
}
