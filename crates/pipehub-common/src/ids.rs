//! Deterministic identifier derivations.
//!
//! All three external systems key registrations off pure functions of the
//! instance coordinates, so re-registration is idempotent everywhere:
//! - store/agent: `{name}-{host with '.'→'-'}-{port}`
//! - store schema: `{name}-v{version with '.'→'_'}`
//! - artifact registry: `{name}-config-v{version with '.'→'_'}`

/// Service instance id used both as the agent registration id and the
/// primary key of the `modules` table.
pub fn service_id(service_name: &str, host: &str, port: i32) -> String {
    format!("{}-{}-{}", service_name, host.replace('.', "-"), port)
}

/// Primary key of a `config_schemas` row.
pub fn schema_id(service_name: &str, version: &str) -> String {
    format!("{}-v{}", service_name, version.replace('.', "_"))
}

/// Versioned artifact id in the schema registry. Blank versions collapse
/// to `v1`.
pub fn versioned_artifact_id(service_name: &str, version: &str) -> String {
    if version.trim().is_empty() {
        format!("{}-config-v1", service_name)
    } else {
        format!("{}-config-v{}", service_name, version.replace('.', "_"))
    }
}

/// Artifact-level id (no version suffix), used for metadata and deletion.
pub fn base_artifact_id(service_name: &str) -> String {
    format!("{}-config", service_name)
}

/// Recover the service name from a `{name}-{host}-{port}` id by stripping
/// the last two dash-separated segments. Returns `None` when the id does
/// not carry at least two dashes.
pub fn extract_service_name(service_id: &str) -> Option<&str> {
    let without_port = &service_id[..service_id.rfind('-')?];
    Some(&without_port[..without_port.rfind('-')?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_id_replaces_dots() {
        assert_eq!(service_id("orders", "10.0.0.4", 9090), "orders-10-0-0-4-9090");
        assert_eq!(service_id("orders", "localhost", 9090), "orders-localhost-9090");
    }

    #[test]
    fn test_service_id_is_stable() {
        let a = service_id("splitter", "127.0.0.1", 7000);
        let b = service_id("splitter", "127.0.0.1", 7000);
        assert_eq!(a, b);
    }

    #[test]
    fn test_schema_id_replaces_dots_with_underscores() {
        assert_eq!(schema_id("splitter", "1.0.0"), "splitter-v1_0_0");
        assert_eq!(schema_id("splitter", "2"), "splitter-v2");
    }

    #[test]
    fn test_versioned_artifact_id() {
        assert_eq!(
            versioned_artifact_id("splitter", "1.0.0"),
            "splitter-config-v1_0_0"
        );
        assert_eq!(versioned_artifact_id("splitter", ""), "splitter-config-v1");
        assert_eq!(versioned_artifact_id("splitter", "  "), "splitter-config-v1");
    }

    #[test]
    fn test_base_artifact_id() {
        assert_eq!(base_artifact_id("splitter"), "splitter-config");
    }

    #[test]
    fn test_extract_service_name() {
        assert_eq!(
            extract_service_name("orders-10-0-0-4-9090"),
            Some("orders-10-0-0")
        );
        assert_eq!(extract_service_name("orders-localhost-9090"), Some("orders"));
        assert_eq!(extract_service_name("bad-id"), None);
        assert_eq!(extract_service_name("bad"), None);
    }

    #[test]
    fn test_extract_inverts_derivation_for_dotless_hosts() {
        let id = service_id("my-service", "nodeA", 8080);
        assert_eq!(extract_service_name(&id), Some("my-service"));
    }
}
