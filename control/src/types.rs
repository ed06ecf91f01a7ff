use serde::{Deserialize, Serialize};
use serde_json::Value;
use zbi_manager::model::{
    BlockchainInfo, EventAction, Instance, PolicyInfo, Project, ResourceObjectType,
    ResourceRequest, SnapshotScheduleType,
};
use zbi_manager::Manifest;

// ============================================================================
// Repository envelopes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PolicyEnvelope {
    pub policy: PolicyInfo,
}

#[derive(Debug, Deserialize)]
pub struct BlockchainEnvelope {
    pub blockchain: BlockchainInfo,
}

#[derive(Debug, Deserialize)]
pub struct ProjectEnvelope {
    pub project: Project,
}

#[derive(Debug, Deserialize)]
pub struct InstanceEnvelope {
    pub instance: Instance,
}

#[derive(Debug, Deserialize)]
pub struct InstancesEnvelope {
    #[serde(default)]
    pub instances: Vec<Instance>,
}

#[derive(Debug, Serialize)]
pub struct UpdateRequestBody<'a> {
    pub request: &'a ResourceRequest,
}

#[derive(Debug, Serialize)]
pub struct ActivityBody {
    pub operation: EventAction,
    pub success: bool,
    pub completed: bool,
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub schedule: Option<SnapshotScheduleType>,
    /// Type of the record a delete_resource action removes.
    #[serde(default, rename = "type")]
    pub resource_type: Option<ResourceObjectType>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ActionRequest {
    /// Type and name of the record to remove, when both are given.
    pub fn resource_target(&self) -> Option<(ResourceObjectType, &str)> {
        match (self.resource_type, self.name.as_deref()) {
            (Some(resource_type), Some(name)) if !name.is_empty() => Some((resource_type, name)),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectManifestsResponse {
    pub project: String,
    pub manifests: Vec<Manifest>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub blockchain: String,
    pub refreshed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error body returned by every failing API call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}
