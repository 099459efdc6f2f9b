//! Default configuration-schema synthesis.

/// Synthesize the default key-value OpenAPI 3.1 schema for a module that
/// did not provide one.
pub fn synthesize_default_schema(module_name: &str) -> String {
    format!(
        "{{\n  \"openapi\": \"3.1.0\",\n  \"info\": {{ \"title\": \"{name} Configuration\", \"version\": \"1.0.0\" }},\n  \"components\": {{\n    \"schemas\": {{\n      \"Config\": {{\n        \"type\": \"object\",\n        \"additionalProperties\": {{ \"type\": \"string\" }},\n        \"description\": \"Key-value configuration for {name}\"\n      }}\n    }}\n  }}\n}}",
        name = module_name
    )
}
