//! Layered schema retrieval tests: store, then registry, then the module.

mod common;

use std::sync::Arc;

use chrono::Utc;

use pipehub_api::module::v1::ServiceRegistrationMetadata;
use pipehub_common::PipehubError;
use pipehub_persistence::entity::config_schema;
use pipehub::handler::schema::SchemaRetrievalHandler;

use common::{MemoryStore, MockRegistry, StaticStubFactory};

fn stored_schema() -> config_schema::Model {
    config_schema::Model {
        schema_id: "splitter-v1_0_0".to_string(),
        service_name: "splitter".to_string(),
        schema_version: "1.0.0".to_string(),
        json_schema: r#"{"openapi": "3.1.0"}"#.to_string(),
        created_at: Utc::now().naive_utc(),
        created_by: Some("registrar".to_string()),
        apicurio_artifact_id: Some("splitter-config-v1_0_0".to_string()),
        apicurio_global_id: Some(3),
        sync_status: "SYNCED".to_string(),
        last_sync_attempt: None,
        sync_error: None,
    }
}

fn retrieval(
    store: MemoryStore,
    registry: MockRegistry,
    stubs: StaticStubFactory,
) -> SchemaRetrievalHandler {
    SchemaRetrievalHandler::new(Arc::new(store), Arc::new(registry), Arc::new(stubs))
}

#[tokio::test]
async fn test_store_hit_short_circuits() {
    let store = MemoryStore::new();
    store.insert_schema(stored_schema());

    let handler = retrieval(store, MockRegistry::new(), StaticStubFactory::unreachable());
    let response = handler
        .get_module_schema("splitter", Some("1.0.0"))
        .await
        .unwrap();

    assert_eq!(response.module_name, "splitter");
    assert_eq!(response.schema_version, "1.0.0");
    assert_eq!(response.metadata.get("sync_status").unwrap(), "SYNCED");
    assert_eq!(
        response.artifact_id.as_deref(),
        Some("splitter-config-v1_0_0")
    );
}

#[tokio::test]
async fn test_store_latest_lookup_without_version() {
    let store = MemoryStore::new();
    store.insert_schema(stored_schema());

    let handler = retrieval(store, MockRegistry::new(), StaticStubFactory::unreachable());
    let response = handler.get_module_schema("splitter", None).await.unwrap();

    assert_eq!(response.schema_version, "1.0.0");
}

#[tokio::test]
async fn test_store_miss_falls_through_to_registry() {
    let registry = MockRegistry::with_schema(r#"{"openapi": "3.1.0"}"#);
    let handler = retrieval(
        MemoryStore::new(),
        registry,
        StaticStubFactory::unreachable(),
    );

    let response = handler.get_module_schema("splitter", None).await.unwrap();
    assert_eq!(response.schema_json, r#"{"openapi": "3.1.0"}"#);
    assert_eq!(response.schema_version, "latest");
    assert_eq!(response.artifact_id.as_deref(), Some("splitter-config"));
}

#[tokio::test]
async fn test_registry_miss_falls_through_to_module() {
    let metadata = ServiceRegistrationMetadata {
        module_name: "splitter".to_string(),
        version: "2.0.0".to_string(),
        json_config_schema: Some(r#"{"openapi": "3.1.0", "x": 1}"#.to_string()),
        display_name: Some("Splitter".to_string()),
        ..Default::default()
    };

    let handler = retrieval(
        MemoryStore::new(),
        MockRegistry::failing(),
        StaticStubFactory::returning(metadata),
    );

    let response = handler.get_module_schema("splitter", None).await.unwrap();
    assert_eq!(response.schema_json, r#"{"openapi": "3.1.0", "x": 1}"#);
    assert_eq!(response.schema_version, "2.0.0");
    assert_eq!(response.metadata.get("source").unwrap(), "module-direct");
    assert_eq!(response.metadata.get("display_name").unwrap(), "Splitter");
}

#[tokio::test]
async fn test_module_without_schema_synthesizes_default() {
    let metadata = ServiceRegistrationMetadata {
        module_name: "splitter".to_string(),
        version: String::new(),
        ..Default::default()
    };

    let handler = retrieval(
        MemoryStore::new(),
        MockRegistry::failing(),
        StaticStubFactory::returning(metadata),
    );

    let response = handler.get_module_schema("splitter", None).await.unwrap();
    assert!(response.schema_json.contains("\"openapi\": \"3.1.0\""));
    assert!(response.schema_json.contains("splitter Configuration"));
    assert_eq!(response.schema_version, "unknown");
}

#[tokio::test]
async fn test_total_miss_is_not_found() {
    let handler = retrieval(
        MemoryStore::new(),
        MockRegistry::failing(),
        StaticStubFactory::unreachable(),
    );

    let result = handler.get_module_schema("splitter", None).await;
    match result {
        Err(PipehubError::NotFound(message)) => {
            assert!(message.starts_with("Module schema not found: splitter"));
        }
        other => panic!("expected NotFound, got {:?}", other.map(|r| r.module_name)),
    }
}
