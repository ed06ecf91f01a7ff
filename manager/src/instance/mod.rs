//! Per-instance-type lifecycle manifest generation.

pub mod lwd;
pub mod zcash;

pub use lwd::LwdResourceManager;
pub use zcash::ZcashResourceManager;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::app::AppResourceHelper;
use crate::config_cache::ConfigSnapshot;
use crate::error::{ManagerError, ManagerResult};
use crate::manifest::Manifest;
use crate::model::{
    BlockchainNodeInfo, EnvoySpec, EventAction, Instance, InstanceSpec, InstanceType,
    KubernetesResource, Labels, Project, ResourceObjectType, ResourceRequest, SnapshotRequest,
    SnapshotScheduleRequest, SnapshotScheduleType, VolumeSpec,
};
use crate::template::{ManifestTemplate, DEPLOYMENT, INGRESS, INGRESS_STOPPED, SERVICE};
use crate::topology;

// Port names in the node metadata
pub const SERVICE_PORT: &str = "service";
pub const ENVOY_PORT: &str = "envoy";
pub const METRICS_PORT: &str = "metrics";
pub const HTTP_PORT: &str = "http";

// Image names in the node metadata
pub const NODE_IMAGE: &str = "node";
pub const LWD_IMAGE: &str = "lwd";
pub const METRICS_IMAGE: &str = "metrics";

pub const LABEL_INSTANCE: &str = "zbi.io/instance";
pub const LABEL_TYPE: &str = "zbi.io/type";
pub const LABEL_PROJECT: &str = "zbi.io/project";

const ZCASH_SVC_PREFIX: &str = "zcashd-svc";
const VOLUME_SUFFIX_LEN: usize = 5;

/// A peer whose request changed as a side effect of an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerUpdate {
    pub id: String,
    pub name: String,
    pub request: ResourceRequest,
}

impl PeerUpdate {
    pub fn new(peer: &Instance, request: ResourceRequest) -> Self {
        Self {
            id: peer.id.clone(),
            name: peer.name.clone(),
            request,
        }
    }
}

/// Everything a lifecycle operation wants done, for the caller to apply.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecyclePlan {
    pub action: EventAction,
    pub instance: String,
    /// Manifests to submit, batch by batch, in order.
    pub batches: Vec<Vec<Manifest>>,
    /// Resource records to delete from the cluster.
    pub removals: Vec<KubernetesResource>,
    /// The instance's own request after topology changes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<ResourceRequest>,
    pub peer_updates: Vec<PeerUpdate>,
}

impl LifecyclePlan {
    pub fn new(action: EventAction, instance: &Instance) -> Self {
        Self {
            action,
            instance: instance.name.clone(),
            batches: Vec::new(),
            removals: Vec::new(),
            request: None,
            peer_updates: Vec::new(),
        }
    }

    pub fn with_batch(mut self, manifests: Vec<Manifest>) -> Self {
        if !manifests.is_empty() {
            self.batches.push(manifests);
        }
        self
    }

    pub fn manifests(&self) -> impl Iterator<Item = &Manifest> {
        self.batches.iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty() && self.removals.is_empty()
    }
}

#[async_trait]
pub trait InstanceResourceManager: Send + Sync {
    fn instance_type(&self) -> InstanceType;

    async fn create_instance_resource(
        &self,
        project: &Project,
        instance: &Instance,
        peers: &[Instance],
    ) -> ManagerResult<LifecyclePlan>;

    async fn create_update_resource(
        &self,
        project: &Project,
        instance: &Instance,
        peers: &[Instance],
    ) -> ManagerResult<LifecyclePlan>;

    async fn create_start_resource(
        &self,
        project: &Project,
        instance: &Instance,
    ) -> ManagerResult<LifecyclePlan>;

    async fn create_stop_resource(
        &self,
        project: &Project,
        instance: &Instance,
    ) -> ManagerResult<LifecyclePlan>;

    async fn create_repair_resource(
        &self,
        project: &Project,
        instance: &Instance,
        peers: &[Instance],
    ) -> ManagerResult<LifecyclePlan>;

    async fn create_snapshot_resource(
        &self,
        project: &Project,
        instance: &Instance,
    ) -> ManagerResult<LifecyclePlan>;

    async fn create_snapshot_schedule_resource(
        &self,
        project: &Project,
        instance: &Instance,
        schedule: SnapshotScheduleType,
    ) -> ManagerResult<LifecyclePlan>;

    async fn create_rotation_resource(
        &self,
        project: &Project,
        instance: &Instance,
    ) -> ManagerResult<LifecyclePlan>;

    async fn create_delete_resource(
        &self,
        project: &Project,
        instance: &Instance,
        peers: &[Instance],
    ) -> ManagerResult<LifecyclePlan>;

    /// Remove a single recorded resource of the instance, leaving the rest.
    async fn create_delete_resource_resource(
        &self,
        _project: &Project,
        instance: &Instance,
        resource_type: ResourceObjectType,
        name: &str,
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("delete_resource", instance);
        delete_resource_plan(instance, resource_type, name)
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Labels derived from instance identity only.
pub fn instance_labels(instance: &Instance) -> Labels {
    Labels::from([
        (LABEL_INSTANCE.to_string(), instance.name.clone()),
        (LABEL_TYPE.to_string(), instance.instance_type.to_string()),
        (LABEL_PROJECT.to_string(), instance.project.clone()),
    ])
}

/// Cluster-local host of a zcash node's service.
pub fn zcash_instance_host(name: &str, namespace: &str) -> String {
    format!("{}-{}.{}.svc.cluster.local", ZCASH_SVC_PREFIX, name, namespace)
}

pub(crate) fn random_suffix(len: usize) -> String {
    Uuid::new_v4().simple().to_string()[..len].to_string()
}

pub(crate) fn new_volume_name(instance: &Instance) -> String {
    format!("{}-{}", instance.name, random_suffix(VOLUME_SUFFIX_LEN))
}

/// Logs how long an operation took when dropped.
pub(crate) struct OperationTimer {
    operation: &'static str,
    instance: String,
    started: Instant,
}

impl OperationTimer {
    pub(crate) fn start(operation: &'static str, instance: &Instance) -> Self {
        debug!(operation, instance = %instance.name, "Starting operation");
        Self {
            operation,
            instance: instance.name.clone(),
            started: Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        debug!(
            operation = self.operation,
            instance = %self.instance,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Operation finished"
        );
    }
}

/// Spec fields common to every node type: identity, policy and envoy.
pub(crate) fn base_spec(
    config: &ConfigSnapshot,
    node: &BlockchainNodeInfo,
    project: &Project,
    instance: &Instance,
    data_volume_name: &str,
) -> ManagerResult<InstanceSpec> {
    let policy = config.policy();

    Ok(InstanceSpec {
        name: instance.name.clone(),
        instance_type: instance.instance_type.to_string(),
        service_account_name: policy.service_account.clone(),
        namespace: project.namespace().to_string(),
        labels: instance_labels(instance),
        domain_name: policy.domain_name.clone(),
        domain_secret: policy.certificate_name.clone(),
        envoy: EnvoySpec::from_policy(&policy.envoy_config, node.require_port(ENVOY_PORT)?),
        data_volume_name: data_volume_name.to_string(),
        ..Default::default()
    })
}

pub(crate) fn volume_spec(
    config: &ConfigSnapshot,
    project: &Project,
    instance: &Instance,
    volume_name: &str,
) -> VolumeSpec {
    let policy = config.policy();
    let volume = &instance.request.volume;

    let size = if volume.size.is_empty() {
        policy.request.storage.clone()
    } else {
        volume.size.clone()
    };

    VolumeSpec {
        volume_name: volume_name.to_string(),
        storage_class: policy.storage_class.clone(),
        namespace: project.namespace().to_string(),
        volume_data_type: volume.volume_type,
        volume_source_type: volume.source.source_type,
        source_name: volume.source.reference.clone(),
        size,
        labels: instance_labels(instance),
    }
}

/// Volume identity for repair: reuse an active claim, else allocate.
pub(crate) struct RepairVolume {
    pub name: String,
    pub reused: bool,
}

impl RepairVolume {
    pub(crate) fn for_instance(instance: &Instance) -> Self {
        match instance.resources.active_claim() {
            Some(claim) => Self {
                name: claim.name.clone(),
                reused: true,
            },
            None => Self {
                name: new_volume_name(instance),
                reused: false,
            },
        }
    }
}

/// Volume manifests unless the claim is being reused.
pub(crate) fn volume_manifests(
    config: &ConfigSnapshot,
    project: &Project,
    instance: &Instance,
    volume: &RepairVolume,
) -> ManagerResult<Vec<Manifest>> {
    if volume.reused {
        return Ok(Vec::new());
    }
    AppResourceHelper::volume_resources(config, &[volume_spec(config, project, instance, &volume.name)])
}

/// Name of the current volume claim, empty when there is none.
pub(crate) fn current_volume_name(instance: &Instance) -> String {
    instance
        .resources
        .persistentvolumeclaim
        .as_ref()
        .map(|claim| claim.name.clone())
        .unwrap_or_default()
}

/// Name of the instance's volume claim record, whatever its status.
pub(crate) fn require_claim(instance: &Instance, action: EventAction) -> ManagerResult<String> {
    instance
        .resources
        .persistentvolumeclaim
        .as_ref()
        .map(|claim| claim.name.clone())
        .ok_or_else(|| {
            ManagerError::InvalidState(format!(
                "{} of {} requires a volume claim",
                action, instance.name
            ))
        })
}

pub(crate) fn start_plan(
    template: &ManifestTemplate,
    instance: &Instance,
    spec: &InstanceSpec,
) -> ManagerResult<LifecyclePlan> {
    let manifests = template.render_manifests(&[DEPLOYMENT, SERVICE, INGRESS], spec)?;
    Ok(LifecyclePlan::new(EventAction::Start, instance).with_batch(manifests))
}

/// The active deployment record, required before a stop.
pub(crate) fn require_deployment(instance: &Instance) -> ManagerResult<&KubernetesResource> {
    instance.resources.active_deployment().ok_or_else(|| {
        ManagerError::InvalidState(format!("instance {} is not active", instance.name))
    })
}

/// Only the deployment is removed on stop; the stopped ingress answers
/// requests while the instance is down.
pub(crate) fn stop_plan(
    template: &ManifestTemplate,
    instance: &Instance,
    deployment: &KubernetesResource,
    spec: &InstanceSpec,
) -> ManagerResult<LifecyclePlan> {
    let ingress = template.render_manifest(INGRESS_STOPPED, spec)?;

    let mut plan = LifecyclePlan::new(EventAction::Stop, instance).with_batch(vec![ingress]);
    plan.removals.push(deployment.clone());
    Ok(plan)
}

pub(crate) fn snapshot_plan(
    config: &ConfigSnapshot,
    project: &Project,
    instance: &Instance,
) -> ManagerResult<LifecyclePlan> {
    let volume_name = require_claim(instance, EventAction::Snapshot)?;

    let req = SnapshotRequest {
        volume_name,
        namespace: project.namespace().to_string(),
        snapshot_class: config.policy().snapshot_class.clone(),
        labels: instance_labels(instance),
    };

    let manifests = AppResourceHelper::snapshot_resources(config, &req)?;
    Ok(LifecyclePlan::new(EventAction::Snapshot, instance).with_batch(manifests))
}

pub(crate) fn schedule_plan(
    config: &ConfigSnapshot,
    project: &Project,
    instance: &Instance,
    schedule: SnapshotScheduleType,
) -> ManagerResult<LifecyclePlan> {
    let volume_name = require_claim(instance, EventAction::Schedule)?;

    let req = SnapshotScheduleRequest::new(
        schedule,
        &volume_name,
        project.namespace(),
        &config.policy().snapshot_class,
        instance_labels(instance),
    );

    let manifests = AppResourceHelper::snapshot_schedule_resources(config, &req)?;
    Ok(LifecyclePlan::new(EventAction::Schedule, instance).with_batch(manifests))
}

/// Every current resource record, plus peers with this instance unlinked.
pub(crate) fn delete_plan(instance: &Instance, peers: &[Instance]) -> LifecyclePlan {
    let mut plan = LifecyclePlan::new(EventAction::Delete, instance);
    plan.removals = instance.resources.to_vec();

    for peer in peers {
        let mut request = peer.request.clone();
        if topology::unlink(&mut request, &instance.name) {
            plan.peer_updates.push(PeerUpdate::new(peer, request));
        }
    }

    plan
}

/// Removal of the one record matching type and name.
pub(crate) fn delete_resource_plan(
    instance: &Instance,
    resource_type: ResourceObjectType,
    name: &str,
) -> ManagerResult<LifecyclePlan> {
    let resource = instance
        .resources
        .to_vec()
        .into_iter()
        .find(|r| r.resource_type == resource_type && r.name == name)
        .ok_or_else(|| {
            ManagerError::NotFound(format!(
                "{} {} of instance {}",
                resource_type, name, instance.name
            ))
        })?;

    let mut plan = LifecyclePlan::new(EventAction::DeleteResource, instance);
    plan.removals.push(resource);
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{KubernetesResources, ResourceStatus};

    #[test]
    fn test_labels_are_deterministic() {
        let instance = Instance::new("z1", InstanceType::Zcash, "p1");
        let labels = instance_labels(&instance);
        assert_eq!(labels, instance_labels(&instance.clone()));
        assert_eq!(labels.get(LABEL_INSTANCE).unwrap(), "z1");
        assert_eq!(labels.get(LABEL_TYPE).unwrap(), "zcash");
        assert_eq!(labels.get(LABEL_PROJECT).unwrap(), "p1");
    }

    #[test]
    fn test_zcash_host() {
        assert_eq!(
            zcash_instance_host("z1", "p1"),
            "zcashd-svc-z1.p1.svc.cluster.local"
        );
    }

    #[test]
    fn test_new_volume_name_has_instance_prefix() {
        let instance = Instance::new("z1", InstanceType::Zcash, "p1");
        let name = new_volume_name(&instance);
        assert!(name.starts_with("z1-"));
        assert_eq!(name.len(), "z1-".len() + VOLUME_SUFFIX_LEN);
        assert_ne!(name, new_volume_name(&instance));
    }

    #[test]
    fn test_repair_volume_reuses_only_active_claim() {
        let mut instance = Instance::new("z1", InstanceType::Zcash, "p1");
        instance.resources = KubernetesResources {
            persistentvolumeclaim: Some(KubernetesResource::new(
                "z1-old42",
                ResourceObjectType::PersistentVolumeClaim,
                ResourceStatus::Active,
            )),
            ..Default::default()
        };
        let volume = RepairVolume::for_instance(&instance);
        assert!(volume.reused);
        assert_eq!(volume.name, "z1-old42");

        if let Some(claim) = instance.resources.persistentvolumeclaim.as_mut() {
            claim.status = ResourceStatus::Failed;
        }
        let volume = RepairVolume::for_instance(&instance);
        assert!(!volume.reused);
        assert!(volume.name.starts_with("z1-"));
        assert_ne!(volume.name, "z1-old42");
    }

    #[test]
    fn test_delete_plan_unlinks_peers() {
        let mut zcash = Instance::new("z1", InstanceType::Zcash, "p1");
        topology::add_lwd_instance(&mut zcash.request, "l1");
        let unrelated = Instance::new("z2", InstanceType::Zcash, "p1");

        let mut lwd = Instance::new("l1", InstanceType::Lwd, "p1");
        lwd.resources.deployment = Some(KubernetesResource::new(
            "l1",
            ResourceObjectType::Deployment,
            ResourceStatus::Active,
        ));

        let plan = delete_plan(&lwd, &[zcash, unrelated]);
        assert_eq!(plan.removals.len(), 1);
        assert_eq!(plan.peer_updates.len(), 1);
        assert_eq!(plan.peer_updates[0].name, "z1");
        assert!(plan.peer_updates[0]
            .request
            .properties
            .as_zcash()
            .unwrap()
            .lwd_instance
            .is_empty());
    }

    #[test]
    fn test_delete_resource_plan_matches_type_and_name() {
        let mut instance = Instance::new("z1", InstanceType::Zcash, "p1");
        instance.resources = KubernetesResources {
            deployment: Some(KubernetesResource::new(
                "z1",
                ResourceObjectType::Deployment,
                ResourceStatus::Active,
            )),
            httpproxy: Some(KubernetesResource::new(
                "z1",
                ResourceObjectType::HttpProxy,
                ResourceStatus::Valid,
            )),
            volumesnapshot: vec![
                KubernetesResource::new("z1-vol01-1", ResourceObjectType::VolumeSnapshot, ResourceStatus::Ready),
                KubernetesResource::new("z1-vol01-2", ResourceObjectType::VolumeSnapshot, ResourceStatus::Ready),
            ],
            ..Default::default()
        };

        let plan =
            delete_resource_plan(&instance, ResourceObjectType::VolumeSnapshot, "z1-vol01-2").unwrap();
        assert_eq!(plan.action, EventAction::DeleteResource);
        assert!(plan.batches.is_empty());
        assert!(plan.peer_updates.is_empty());
        assert_eq!(plan.removals.len(), 1);
        assert_eq!(plan.removals[0].name, "z1-vol01-2");

        // Same name, other type
        let plan = delete_resource_plan(&instance, ResourceObjectType::HttpProxy, "z1").unwrap();
        assert_eq!(plan.removals[0].resource_type, ResourceObjectType::HttpProxy);

        let err = delete_resource_plan(&instance, ResourceObjectType::Service, "z1").unwrap_err();
        assert!(matches!(err, ManagerError::NotFound(_)));
    }
}
