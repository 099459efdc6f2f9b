// Apicurio Registry v3 API data models

use serde::{Deserialize, Serialize};

/// POST /groups/{group}/artifacts request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArtifact {
    pub artifact_id: String,
    pub artifact_type: String,
    pub first_version: CreateVersion,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVersion {
    pub version: String,
    pub content: VersionContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionContent {
    pub content: String,
    pub content_type: String,
}

/// Create-artifact response; the registry nests the resulting version
#[derive(Debug, Clone, Deserialize)]
pub struct CreateArtifactResponse {
    pub version: VersionMetaData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetaData {
    pub global_id: i64,
    pub version: String,
}

/// GET /groups/{group}/artifacts/{id} response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    #[serde(default)]
    pub artifact_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub modified_on: Option<String>,
}

/// GET /search/artifacts response
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactSearchResults {
    #[serde(default)]
    pub artifacts: Vec<SearchedArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchedArtifact {
    #[serde(default)]
    pub artifact_id: String,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub artifact_type: Option<String>,
}

/// Outcome of a create-or-update call.
#[derive(Debug, Clone)]
pub struct SchemaRegistration {
    pub artifact_id: String,
    pub global_id: i64,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_artifact_wire_shape() {
        let create = CreateArtifact {
            artifact_id: "splitter-config-v1_0_0".to_string(),
            artifact_type: "JSON".to_string(),
            first_version: CreateVersion {
                version: "1.0.0".to_string(),
                content: VersionContent {
                    content: "{}".to_string(),
                    content_type: "application/json".to_string(),
                },
            },
        };

        let json = serde_json::to_value(&create).unwrap();
        assert_eq!(json["artifactId"], "splitter-config-v1_0_0");
        assert_eq!(json["artifactType"], "JSON");
        assert_eq!(json["firstVersion"]["content"]["contentType"], "application/json");
    }

    #[test]
    fn test_version_metadata_deserializes() {
        let body = r#"{"version": {"globalId": 42, "version": "1.0.0", "artifactId": "x"}}"#;
        let response: CreateArtifactResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.version.global_id, 42);
        assert_eq!(response.version.version, "1.0.0");
    }
}
