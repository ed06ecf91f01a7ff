use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceObjectType {
    Namespace,
    Deployment,
    Service,
    #[serde(alias = "Configmap")]
    ConfigMap,
    Secret,
    Pod,
    PersistentVolume,
    PersistentVolumeClaim,
    VolumeSnapshot,
    VolumeSnapshotClass,
    SnapshotSchedule,
    #[serde(rename = "HTTPProxy", alias = "HTTPproxy")]
    HttpProxy,
}

impl ResourceObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceObjectType::Namespace => "Namespace",
            ResourceObjectType::Deployment => "Deployment",
            ResourceObjectType::Service => "Service",
            ResourceObjectType::ConfigMap => "ConfigMap",
            ResourceObjectType::Secret => "Secret",
            ResourceObjectType::Pod => "Pod",
            ResourceObjectType::PersistentVolume => "PersistentVolume",
            ResourceObjectType::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceObjectType::VolumeSnapshot => "VolumeSnapshot",
            ResourceObjectType::VolumeSnapshotClass => "VolumeSnapshotClass",
            ResourceObjectType::SnapshotSchedule => "SnapshotSchedule",
            ResourceObjectType::HttpProxy => "HTTPProxy",
        }
    }
}

impl fmt::Display for ResourceObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the wire names and their aliases.
impl FromStr for ResourceObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| format!("unknown resource type: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    New,
    Active,
    Inactive,
    Failed,
    Pending,
    Progressing,
    Bound,
    Running,
    Stopped,
    Valid,
    Ready,
    Deleted,
    #[serde(other)]
    Unknown,
}

/// A record of one cluster object the repository believes exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesResource {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceObjectType,
    pub status: ResourceStatus,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

impl KubernetesResource {
    pub fn new(name: &str, resource_type: ResourceObjectType, status: ResourceStatus) -> Self {
        Self {
            name: name.to_string(),
            namespace: String::new(),
            resource_type,
            status,
            properties: Map::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ResourceStatus::Active
    }
}

/// Resource-state snapshot of a project or instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<KubernetesResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configmap: Option<KubernetesResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<KubernetesResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistentvolumeclaim: Option<KubernetesResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<KubernetesResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<KubernetesResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub httpproxy: Option<KubernetesResource>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumesnapshot: Vec<KubernetesResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshotschedule: Option<KubernetesResource>,
}

impl KubernetesResources {
    /// Flatten the snapshot into a list, each present record exactly once.
    pub fn to_vec(&self) -> Vec<KubernetesResource> {
        let singles = [
            &self.namespace,
            &self.configmap,
            &self.secret,
            &self.persistentvolumeclaim,
            &self.deployment,
            &self.service,
            &self.httpproxy,
        ];

        let mut array: Vec<KubernetesResource> = singles.into_iter().flatten().cloned().collect();
        array.extend(self.volumesnapshot.iter().cloned());
        if let Some(schedule) = &self.snapshotschedule {
            array.push(schedule.clone());
        }
        array
    }

    pub fn is_empty(&self) -> bool {
        self.to_vec().is_empty()
    }

    /// The volume claim record, but only when it is active.
    pub fn active_claim(&self) -> Option<&KubernetesResource> {
        self.persistentvolumeclaim.as_ref().filter(|r| r.is_active())
    }

    pub fn active_deployment(&self) -> Option<&KubernetesResource> {
        self.deployment.as_ref().filter(|r| r.is_active())
    }

    pub fn active_secret(&self) -> Option<&KubernetesResource> {
        self.secret.as_ref().filter(|r| r.is_active())
    }
}
