use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::{
    DataSourceType, DataVolumeType, InstanceProperties, InstanceType, KubernetesResources,
    NetworkType,
};
use crate::error::{ManagerError, ManagerResult};

/// Namespace-scoped grouping of instances. The name doubles as the namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub blockchain: String,
    #[serde(default)]
    pub network: NetworkType,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub resources: KubernetesResources,
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

impl Project {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn namespace(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeSource {
    #[serde(rename = "type", default)]
    pub source_type: DataSourceType,
    #[serde(rename = "ref", default, skip_serializing_if = "String::is_empty")]
    pub reference: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeRequest {
    #[serde(rename = "type", default)]
    pub volume_type: DataVolumeType,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub source: VolumeSource,
}

/// Declarative input for creating or updating an instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequest {
    pub cpu: String,
    pub memory: String,
    pub peers: Vec<String>,
    pub volume: VolumeRequest,
    pub properties: InstanceProperties,
}

impl ResourceRequest {
    pub fn new(instance_type: InstanceType) -> Self {
        Self {
            cpu: String::new(),
            memory: String::new(),
            peers: Vec::new(),
            volume: VolumeRequest::default(),
            properties: InstanceProperties::default_for(instance_type),
        }
    }

    fn resolve(instance_type: InstanceType, record: RequestRecord) -> ManagerResult<Self> {
        Ok(Self {
            cpu: record.cpu,
            memory: record.memory,
            peers: record.peers,
            volume: record.volume,
            properties: InstanceProperties::resolve(instance_type, &record.properties)?,
        })
    }
}

/// A deployed node within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "InstanceRecord")]
pub struct Instance {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub instance_type: InstanceType,
    pub project: String,
    pub network: NetworkType,
    pub owner: String,
    pub status: String,
    pub state: String,
    pub request: ResourceRequest,
    pub resources: KubernetesResources,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

impl Instance {
    pub fn new(name: &str, instance_type: InstanceType, project: &str) -> Self {
        Self {
            id: name.to_string(),
            name: name.to_string(),
            instance_type,
            project: project.to_string(),
            network: NetworkType::default(),
            owner: String::new(),
            status: String::new(),
            state: String::new(),
            request: ResourceRequest::new(instance_type),
            resources: KubernetesResources::default(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn properties(&self) -> &InstanceProperties {
        &self.request.properties
    }
}

// ============================================================================
// Wire records
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RequestRecord {
    cpu: String,
    memory: String,
    peers: Vec<String>,
    volume: VolumeRequest,
    properties: Map<String, Value>,
}

/// Instances may carry their project as a name or as an embedded object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProjectRef {
    Name(String),
    Embedded {
        name: String,
        #[serde(default)]
        network: Option<NetworkType>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceRecord {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(rename = "type", alias = "instanceType")]
    instance_type: String,
    project: ProjectRef,
    #[serde(default)]
    network: Option<NetworkType>,
    #[serde(default)]
    owner: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    request: Option<RequestRecord>,
    #[serde(default)]
    resources: KubernetesResources,
    #[serde(default, with = "time::serde::rfc3339::option")]
    created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    updated_at: Option<OffsetDateTime>,
}

impl TryFrom<InstanceRecord> for Instance {
    type Error = ManagerError;

    fn try_from(record: InstanceRecord) -> Result<Self, Self::Error> {
        let instance_type: InstanceType = record.instance_type.parse()?;

        let (project, project_network) = match record.project {
            ProjectRef::Name(name) => (name, None),
            ProjectRef::Embedded { name, network } => (name, network),
        };

        Ok(Instance {
            id: record.id,
            name: record.name,
            instance_type,
            project,
            network: record.network.or(project_network).unwrap_or_default(),
            owner: record.owner,
            status: record.status,
            state: record.state,
            request: ResourceRequest::resolve(instance_type, record.request.unwrap_or_default())?,
            resources: record.resources,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceStatus;
    use serde_json::json;

    #[test]
    fn test_instance_from_wire() {
        let wire = json!({
            "id": "64f0",
            "name": "l1",
            "type": "lwd",
            "project": {"name": "p1", "network": "mainnet"},
            "request": {
                "peers": ["z1"],
                "volume": {"type": "pvc", "size": "10", "source": {"type": "new"}},
                "properties": {"zcashInstance": "z1", "logLevel": "info"}
            },
            "resources": {
                "deployment": {"name": "l1", "type": "Deployment", "status": "active"}
            },
            "createdAt": "2024-03-01T10:00:00Z"
        });

        let instance: Instance = serde_json::from_value(wire).unwrap();
        assert_eq!(instance.instance_type, InstanceType::Lwd);
        assert_eq!(instance.project, "p1");
        assert_eq!(instance.network, NetworkType::Mainnet);
        assert_eq!(instance.request.volume.source.source_type, DataSourceType::New);
        assert_eq!(
            instance.properties().as_lwd().unwrap().zcash_instance.first(),
            Some("z1")
        );
        assert_eq!(
            instance.resources.deployment.as_ref().unwrap().status,
            ResourceStatus::Active
        );
        assert!(instance.created_at.is_some());
    }

    #[test]
    fn test_instance_unknown_type_rejected() {
        let wire = json!({"name": "zb1", "type": "zebra", "project": "p1"});
        let err = serde_json::from_value::<Instance>(wire).unwrap_err();
        assert!(err.to_string().contains("unsupported instance type"));
    }

    #[test]
    fn test_lwd_with_two_upstreams_rejected() {
        let wire = json!({
            "name": "l1",
            "type": "lwd",
            "project": "p1",
            "request": {"properties": {"zcashInstance": ["z1", "z2"]}}
        });
        let err = serde_json::from_value::<Instance>(wire).unwrap_err();
        assert!(err.to_string().contains("zcashInstance"));
    }

    #[test]
    fn test_instance_serializes_typed_properties_as_map() {
        let mut instance = Instance::new("z1", InstanceType::Zcash, "p1");
        instance
            .request
            .properties
            .as_zcash_mut()
            .unwrap()
            .peers
            .insert("z2");

        let value = serde_json::to_value(&instance).unwrap();
        assert_eq!(value["type"], "zcash");
        assert_eq!(value["request"]["properties"]["peers"], json!(["z2"]));

        let back: Instance = serde_json::from_value(value).unwrap();
        assert_eq!(back, instance);
    }
}
