use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

use crate::error::{ManagerError, ManagerResult};

// ============================================================================
// Cluster policy
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvoyConfig {
    pub image: String,
    pub command: Vec<String>,
    pub timeout: f32,
    pub access_authorization: bool,
    #[serde(rename = "authServerURL")]
    pub auth_server_url: String,
    pub auth_server_port: u16,
    pub authentication_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestDefaults {
    pub cpu: String,
    pub memory: String,
    pub storage: String,
}

/// Cluster-wide defaults applied to every generated manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyInfo {
    pub storage_class: String,
    pub snapshot_class: String,
    pub domain_name: String,
    pub certificate_name: String,
    pub service_account: String,
    pub informer_resync: i32,
    pub enable_monitor: bool,
    pub require_authentication: bool,
    pub envoy_config: EnvoyConfig,
    pub request: RequestDefaults,
}

// ============================================================================
// Blockchain metadata
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KvPair {
    pub key: String,
    pub value: Value,
}

impl KvPair {
    pub fn new(key: &str, value: impl Into<Value>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
        }
    }
}

/// Per-node-type metadata: ports, images, and config fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainNodeInfo {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub endpoints: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub ports: BTreeMap<String, u16>,
    #[serde(default)]
    pub images: Vec<ImageInfo>,
    #[serde(default)]
    pub settings: HashMap<String, Vec<KvPair>>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl BlockchainNodeInfo {
    pub fn port(&self, name: &str) -> Option<u16> {
        self.ports.get(name).copied()
    }

    pub fn require_port(&self, name: &str) -> ManagerResult<u16> {
        self.port(name).ok_or_else(|| {
            ManagerError::NotFound(format!("port '{}' for node type {}", name, self.node_type))
        })
    }

    pub fn image_url(&self, name: &str) -> Option<&str> {
        self.images
            .iter()
            .find(|image| image.name == name)
            .map(|image| image.url.as_str())
    }

    pub fn require_image(&self, name: &str) -> ManagerResult<&str> {
        self.image_url(name).ok_or_else(|| {
            ManagerError::NotFound(format!("image '{}' for node type {}", name, self.node_type))
        })
    }

    /// Settings group, empty when the group is not defined.
    pub fn settings_group(&self, group: &str) -> &[KvPair] {
        self.settings.get(group).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockchainInfo {
    pub name: String,
    pub networks: Vec<String>,
    pub nodes: Vec<BlockchainNodeInfo>,
    /// Base64-encoded template text keyed by node type, "app" or "project".
    pub templates: BTreeMap<String, String>,
}
