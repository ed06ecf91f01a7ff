//! Data objects handed to manifest templates.
//!
//! Field names serialize in PascalCase, so a template reads `spec.Name`,
//! `spec.Ports.GRPC` or `spec.Properties.ZcashInstance`.

use serde::Serialize;
use std::collections::BTreeMap;

use super::{
    DataSourceType, DataVolumeType, EnvoyConfig, InstanceType, KvPair, SnapshotScheduleType,
};

pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvoySpec {
    pub image: String,
    pub port: u16,
    pub command: Vec<String>,
    pub timeout: f32,
    pub access_authorization: bool,
    #[serde(rename = "AuthServerURL")]
    pub auth_server_url: String,
    pub auth_server_port: u16,
    pub authentication_enabled: bool,
}

impl EnvoySpec {
    pub fn from_policy(config: &EnvoyConfig, port: u16) -> Self {
        Self {
            image: config.image.clone(),
            port,
            command: config.command.clone(),
            timeout: config.timeout,
            access_authorization: config.access_authorization,
            auth_server_url: config.auth_server_url.clone(),
            auth_server_port: config.auth_server_port,
            authentication_enabled: config.authentication_enabled,
        }
    }
}

/// RPC credentials rendered into the instance secret. Debug output is redacted.
#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ZcashSpecProperties {
    pub zcash_conf: Vec<KvPair>,
    pub miner: bool,
    pub log_level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LwdSpecProperties {
    pub zcash_instance_name: String,
    /// Cluster-local host of the upstream zcash service.
    pub zcash_instance: String,
    pub zcash_port: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SpecProperties {
    #[default]
    None,
    Zcash(ZcashSpecProperties),
    Lwd(LwdSpecProperties),
}

impl SpecProperties {
    pub fn as_lwd(&self) -> Option<&LwdSpecProperties> {
        match self {
            SpecProperties::Lwd(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_zcash(&self) -> Option<&ZcashSpecProperties> {
        match self {
            SpecProperties::Zcash(p) => Some(p),
            _ => None,
        }
    }
}

/// Data object for every instance template section.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceSpec {
    pub name: String,
    pub instance_type: String,
    pub service_account_name: String,
    pub namespace: String,
    pub labels: Labels,
    pub domain_name: String,
    pub domain_secret: String,
    pub envoy: EnvoySpec,
    pub data_volume_name: String,
    pub images: BTreeMap<String, String>,
    pub ports: BTreeMap<String, u16>,
    pub credentials: Option<Credentials>,
    pub properties: SpecProperties,
}

// ============================================================================
// App template data
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeSpec {
    pub volume_name: String,
    pub storage_class: String,
    pub namespace: String,
    pub volume_data_type: DataVolumeType,
    pub volume_source_type: DataSourceType,
    pub source_name: String,
    pub size: String,
    pub labels: Labels,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRequest {
    pub volume_name: String,
    pub namespace: String,
    pub snapshot_class: String,
    pub labels: Labels,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotScheduleRequest {
    pub schedule: SnapshotScheduleType,
    pub volume_name: String,
    pub namespace: String,
    pub snapshot_class: String,
    pub backup_expiration: String,
    pub max_backup_count: u32,
    pub labels: Labels,
}

impl SnapshotScheduleRequest {
    /// Build a request with the retention that goes with the schedule.
    pub fn new(
        schedule: SnapshotScheduleType,
        volume_name: &str,
        namespace: &str,
        snapshot_class: &str,
        labels: Labels,
    ) -> Self {
        let (max_backup_count, expiration) = schedule.retention();
        Self {
            schedule,
            volume_name: volume_name.to_string(),
            namespace: namespace.to_string(),
            snapshot_class: snapshot_class.to_string(),
            backup_expiration: expiration.to_string(),
            max_backup_count,
            labels,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnapshotSpec {
    pub snapshot_name: String,
    pub volume_name: String,
    pub namespace: String,
    pub snapshot_class: String,
    pub labels: Labels,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnapshotScheduleSpec {
    pub schedule_name: String,
    pub name: String,
    pub namespace: String,
    pub schedule: String,
    pub schedule_type: SnapshotScheduleType,
    pub backup_expiration: String,
    pub max_backup_count: u32,
    pub snapshot_class: String,
    pub labels: Labels,
}

// ============================================================================
// Project template data
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IngressInclude {
    pub name: String,
    pub namespace: String,
    pub instance_type: InstanceType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProjectSpec {
    pub name: String,
    pub namespace: String,
    pub labels: Labels,
    pub domain_name: String,
    pub domain_secret: String,
    pub instances: Vec<IngressInclude>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials {
            username: "zcash-abc".to_string(),
            password: "0123456789abcdef".to_string(),
        };
        let printed = format!("{:?}", creds);
        assert!(printed.contains("zcash-abc"));
        assert!(!printed.contains("0123456789abcdef"));
    }

    #[test]
    fn test_instance_spec_field_names() {
        let spec = InstanceSpec {
            name: "l1".to_string(),
            properties: SpecProperties::Lwd(LwdSpecProperties {
                zcash_instance: "zcashd-svc-z1.p1.svc.cluster.local".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["Name"], "l1");
        assert_eq!(
            value["Properties"]["ZcashInstance"],
            "zcashd-svc-z1.p1.svc.cluster.local"
        );
        assert!(value["Credentials"].is_null());
        assert!(value["Envoy"].get("AuthServerURL").is_some());
    }

    #[test]
    fn test_schedule_request_takes_retention_from_schedule() {
        let req = SnapshotScheduleRequest::new(
            SnapshotScheduleType::Weekly,
            "z1-abcde",
            "p1",
            "csi-snap",
            Labels::new(),
        );
        assert_eq!(req.max_backup_count, 4);
        assert_eq!(req.backup_expiration, "672h");
    }
}
