//! Wire and domain model shared by the manager and its collaborators.

pub mod config;
pub mod instance;
pub mod properties;
pub mod resources;
pub mod spec;

pub use config::{
    BlockchainInfo, BlockchainNodeInfo, EnvoyConfig, ImageInfo, KvPair, PolicyInfo, RequestDefaults,
};
pub use instance::{Instance, Project, ResourceRequest, VolumeRequest, VolumeSource};
pub use properties::{InstanceProperties, LwdProperties, PeerSet, ZcashProperties};
pub use resources::{KubernetesResource, KubernetesResources, ResourceObjectType, ResourceStatus};
pub use spec::{
    Credentials, EnvoySpec, IngressInclude, InstanceSpec, Labels, LwdSpecProperties, ProjectSpec,
    SnapshotRequest, SnapshotScheduleRequest, SnapshotScheduleSpec, SnapshotSpec, SpecProperties,
    VolumeSpec, ZcashSpecProperties,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ManagerError;

// ============================================================================
// Instance and network types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceType {
    Zcash,
    Lwd,
}

impl InstanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceType::Zcash => "zcash",
            InstanceType::Lwd => "lwd",
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceType {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zcash" => Ok(InstanceType::Zcash),
            "lwd" => Ok(InstanceType::Lwd),
            other => Err(ManagerError::UnsupportedType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Mainnet,
    #[default]
    Testnet,
    Regnet,
}

// ============================================================================
// Lifecycle actions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Create,
    Update,
    Start,
    Stop,
    Repair,
    Snapshot,
    Schedule,
    Rotate,
    Delete,
    #[serde(rename = "delete_resource")]
    DeleteResource,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Create => "create",
            EventAction::Update => "update",
            EventAction::Start => "start",
            EventAction::Stop => "stop",
            EventAction::Repair => "repair",
            EventAction::Snapshot => "snapshot",
            EventAction::Schedule => "schedule",
            EventAction::Rotate => "rotate",
            EventAction::Delete => "delete",
            EventAction::DeleteResource => "delete_resource",
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(EventAction::Create),
            "update" => Ok(EventAction::Update),
            "start" => Ok(EventAction::Start),
            "stop" => Ok(EventAction::Stop),
            "repair" => Ok(EventAction::Repair),
            "snapshot" => Ok(EventAction::Snapshot),
            "schedule" => Ok(EventAction::Schedule),
            "rotate" => Ok(EventAction::Rotate),
            "delete" => Ok(EventAction::Delete),
            "delete_resource" => Ok(EventAction::DeleteResource),
            other => Err(format!("unknown action: {}", other)),
        }
    }
}

// ============================================================================
// Volumes and snapshots
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotScheduleType {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl SnapshotScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotScheduleType::Hourly => "hourly",
            SnapshotScheduleType::Daily => "daily",
            SnapshotScheduleType::Weekly => "weekly",
            SnapshotScheduleType::Monthly => "monthly",
        }
    }

    /// Cron expression the snapshot scheduler runs on.
    pub fn cron(&self) -> &'static str {
        match self {
            SnapshotScheduleType::Hourly => "0 * * * *",
            SnapshotScheduleType::Daily => "0 0 * * *",
            SnapshotScheduleType::Weekly => "0 0 * * 0",
            SnapshotScheduleType::Monthly => "0 0 1 * *",
        }
    }

    /// Retention as (max snapshot count, expiration).
    pub fn retention(&self) -> (u32, &'static str) {
        match self {
            SnapshotScheduleType::Hourly => (24, "24h"),
            SnapshotScheduleType::Daily => (7, "168h"),
            SnapshotScheduleType::Weekly => (4, "672h"),
            SnapshotScheduleType::Monthly => (12, "8760h"),
        }
    }
}

/// Where a new volume's data comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataSourceType {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "new")]
    New,
    #[serde(rename = "pvc")]
    Claim,
    #[serde(rename = "snapshot")]
    Snapshot,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataVolumeType {
    Ephemeral,
    #[default]
    Pvc,
}
