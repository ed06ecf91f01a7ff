use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::{
    base_spec, current_volume_name, delete_plan, new_volume_name, require_deployment,
    schedule_plan, snapshot_plan, start_plan, stop_plan, volume_manifests, zcash_instance_host,
    InstanceResourceManager, LifecyclePlan, OperationTimer, PeerUpdate, RepairVolume, HTTP_PORT,
    LWD_IMAGE, SERVICE_PORT,
};
use crate::config_cache::{ConfigCache, ConfigSnapshot};
use crate::error::{ManagerError, ManagerResult};
use crate::model::{
    BlockchainNodeInfo, EventAction, Instance, InstanceSpec, InstanceType, LwdSpecProperties,
    Project, ResourceRequest, SnapshotScheduleType, SpecProperties,
};
use crate::template::{
    ManifestTemplate, DEPLOYMENT, ENVOY_CONF, INGRESS, LWD_CONF, SERVICE, ZCASH_CONF,
};
use crate::topology;

const LIGHTWALLET_IMAGE_KEY: &str = "Lightwallet";
const GRPC_PORT_KEY: &str = "GRPC";
const HTTP_PORT_KEY: &str = "HTTP";

/// Lightwalletd gateway manifests. A gateway binds to exactly one zcash node.
pub struct LwdResourceManager {
    cache: Arc<ConfigCache>,
}

impl LwdResourceManager {
    pub fn new(cache: Arc<ConfigCache>) -> Self {
        Self { cache }
    }

    /// Resolve the upstream to bind to and, on a rebind, the node it
    /// replaces. Peers are either the upstream alone, or the new upstream
    /// plus the currently recorded one.
    fn binding<'a>(
        instance: &Instance,
        peers: &'a [Instance],
    ) -> ManagerResult<(&'a Instance, Option<&'a Instance>)> {
        if let Some(other) = peers.iter().find(|p| p.instance_type != InstanceType::Zcash) {
            return Err(ManagerError::InvalidPeering(format!(
                "lightwallet instance {} can only be paired with a zcash instance, got {} ({})",
                instance.name, other.name, other.instance_type
            )));
        }

        let current = topology::upstream(&instance.request);
        match peers {
            [zcash] => Ok((zcash, None)),
            [a, b] if current == Some(a.name.as_str()) && b.name != a.name => Ok((b, Some(a))),
            [a, b] if current == Some(b.name.as_str()) && a.name != b.name => Ok((a, Some(b))),
            _ => Err(ManagerError::InvalidPeering(format!(
                "lightwallet instance {} must be paired with exactly one zcash instance, got {}",
                instance.name,
                peers.len()
            ))),
        }
    }

    fn node_spec(
        config: &ConfigSnapshot,
        node: &BlockchainNodeInfo,
        project: &Project,
        instance: &Instance,
        data_volume_name: &str,
    ) -> ManagerResult<InstanceSpec> {
        let mut spec = base_spec(config, node, project, instance, data_volume_name)?;

        spec.images = BTreeMap::from([(
            LIGHTWALLET_IMAGE_KEY.to_string(),
            node.require_image(LWD_IMAGE)?.to_string(),
        )]);
        spec.ports = BTreeMap::from([(GRPC_PORT_KEY.to_string(), node.require_port(SERVICE_PORT)?)]);
        if let Some(http) = node.port(HTTP_PORT) {
            spec.ports.insert(HTTP_PORT_KEY.to_string(), http);
        }

        Ok(spec)
    }

    /// Upstream binding: host and port of the zcash node's service.
    pub(crate) fn properties(
        config: &ConfigSnapshot,
        project: &Project,
        instance: &Instance,
        zcash: &Instance,
    ) -> ManagerResult<SpecProperties> {
        let zcash_port = config
            .node_info(InstanceType::Zcash)?
            .require_port(SERVICE_PORT)?;

        Ok(SpecProperties::Lwd(LwdSpecProperties {
            zcash_instance_name: zcash.name.clone(),
            zcash_instance: zcash_instance_host(&zcash.name, project.namespace()),
            zcash_port: zcash_port.to_string(),
            log_level: instance
                .request
                .properties
                .log_level()
                .unwrap_or_default()
                .to_string(),
        }))
    }

    /// Bind to the upstream and list this gateway on the upstream's request.
    /// A replaced upstream drops the gateway from its list.
    fn link_upstream(
        instance: &Instance,
        zcash: &Instance,
        previous: Option<&Instance>,
    ) -> (ResourceRequest, Vec<PeerUpdate>) {
        let mut request = instance.request.clone();
        topology::add_upstream(&mut request, &zcash.name);

        let mut updates = Vec::new();
        let mut zcash_request = zcash.request.clone();
        if topology::add_lwd_instance(&mut zcash_request, &instance.name) {
            updates.push(PeerUpdate::new(zcash, zcash_request));
        }

        if let Some(previous) = previous {
            let mut previous_request = previous.request.clone();
            if topology::remove_lwd_instance(&mut previous_request, &instance.name) {
                info!(
                    instance = %instance.name,
                    from = %previous.name,
                    to = %zcash.name,
                    "Rebinding lightwalletd upstream"
                );
                updates.push(PeerUpdate::new(previous, previous_request));
            }
        }

        (request, updates)
    }

    fn provision(
        config: &ConfigSnapshot,
        template: &ManifestTemplate,
        project: &Project,
        instance: &Instance,
        (zcash, previous): (&Instance, Option<&Instance>),
        volume: &RepairVolume,
        action: EventAction,
    ) -> ManagerResult<LifecyclePlan> {
        let node = config.node_info(InstanceType::Lwd)?;

        let mut spec = Self::node_spec(config, node, project, instance, &volume.name)?;
        spec.properties = Self::properties(config, project, instance, zcash)?;

        let mut manifests = template.render_manifests(
            &[LWD_CONF, ZCASH_CONF, ENVOY_CONF, DEPLOYMENT, SERVICE],
            &spec,
        )?;
        manifests.extend(volume_manifests(config, project, instance, volume)?);
        manifests.push(template.render_manifest(INGRESS, &spec)?);

        let (request, peer_updates) = Self::link_upstream(instance, zcash, previous);

        let mut plan = LifecyclePlan::new(action, instance).with_batch(manifests);
        plan.request = Some(request);
        plan.peer_updates = peer_updates;
        Ok(plan)
    }
}

#[async_trait]
impl InstanceResourceManager for LwdResourceManager {
    fn instance_type(&self) -> InstanceType {
        InstanceType::Lwd
    }

    async fn create_instance_resource(
        &self,
        project: &Project,
        instance: &Instance,
        peers: &[Instance],
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("lwd.create_instance_resource", instance);
        let binding = Self::binding(instance, peers)?;

        let config = self.cache.snapshot().await?;
        let template = config.templates().get_instance_template(InstanceType::Lwd)?;

        let volume = RepairVolume {
            name: new_volume_name(instance),
            reused: false,
        };

        let plan = Self::provision(
            &config,
            &template,
            project,
            instance,
            binding,
            &volume,
            EventAction::Create,
        )?;

        info!(
            instance = %instance.name,
            zcash = %binding.0.name,
            volume = %volume.name,
            "Generated lightwalletd instance resources"
        );
        Ok(plan)
    }

    async fn create_update_resource(
        &self,
        project: &Project,
        instance: &Instance,
        peers: &[Instance],
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("lwd.create_update_resource", instance);
        let (zcash, previous) = Self::binding(instance, peers)?;

        let config = self.cache.snapshot().await?;
        let node = config.node_info(InstanceType::Lwd)?;
        let template = config.templates().get_instance_template(InstanceType::Lwd)?;

        let volume_name = current_volume_name(instance);
        let mut spec = Self::node_spec(&config, node, project, instance, &volume_name)?;
        spec.properties = Self::properties(&config, project, instance, zcash)?;

        let manifests = template.render_manifests(&[LWD_CONF, ZCASH_CONF], &spec)?;
        let (request, peer_updates) = Self::link_upstream(instance, zcash, previous);

        let mut plan = LifecyclePlan::new(EventAction::Update, instance).with_batch(manifests);
        plan.request = Some(request);
        plan.peer_updates = peer_updates;
        Ok(plan)
    }

    async fn create_start_resource(
        &self,
        project: &Project,
        instance: &Instance,
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("lwd.create_start_resource", instance);
        let volume_name = super::require_claim(instance, EventAction::Start)?;

        let config = self.cache.snapshot().await?;
        let node = config.node_info(InstanceType::Lwd)?;
        let template = config.templates().get_instance_template(InstanceType::Lwd)?;

        let spec = Self::node_spec(&config, node, project, instance, &volume_name)?;
        start_plan(&template, instance, &spec)
    }

    async fn create_stop_resource(
        &self,
        project: &Project,
        instance: &Instance,
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("lwd.create_stop_resource", instance);
        let deployment = require_deployment(instance)?;

        let config = self.cache.snapshot().await?;
        let node = config.node_info(InstanceType::Lwd)?;
        let template = config.templates().get_instance_template(InstanceType::Lwd)?;

        let spec = base_spec(&config, node, project, instance, "")?;
        stop_plan(&template, instance, deployment, &spec)
    }

    async fn create_repair_resource(
        &self,
        project: &Project,
        instance: &Instance,
        peers: &[Instance],
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("lwd.create_repair_resource", instance);
        let binding = Self::binding(instance, peers)?;

        let config = self.cache.snapshot().await?;
        let template = config.templates().get_instance_template(InstanceType::Lwd)?;

        let volume = RepairVolume::for_instance(instance);
        let plan = Self::provision(
            &config,
            &template,
            project,
            instance,
            binding,
            &volume,
            EventAction::Repair,
        )?;

        info!(
            instance = %instance.name,
            volume = %volume.name,
            reused = volume.reused,
            "Generated lightwalletd repair resources"
        );
        Ok(plan)
    }

    async fn create_snapshot_resource(
        &self,
        project: &Project,
        instance: &Instance,
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("lwd.create_snapshot_resource", instance);
        let config = self.cache.snapshot().await?;
        snapshot_plan(&config, project, instance)
    }

    async fn create_snapshot_schedule_resource(
        &self,
        project: &Project,
        instance: &Instance,
        schedule: SnapshotScheduleType,
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("lwd.create_snapshot_schedule_resource", instance);
        let config = self.cache.snapshot().await?;
        schedule_plan(&config, project, instance, schedule)
    }

    /// Gateways hold no rotatable credentials.
    async fn create_rotation_resource(
        &self,
        _project: &Project,
        instance: &Instance,
    ) -> ManagerResult<LifecyclePlan> {
        Ok(LifecyclePlan::new(EventAction::Rotate, instance))
    }

    async fn create_delete_resource(
        &self,
        _project: &Project,
        instance: &Instance,
        peers: &[Instance],
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("lwd.create_delete_resource", instance);
        Ok(delete_plan(instance, peers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{running, sample_blockchain, sample_policy, StubRepository};
    use serde_json::Value;

    fn manager(repo: &Arc<StubRepository>) -> LwdResourceManager {
        LwdResourceManager::new(Arc::new(ConfigCache::with_defaults(repo.clone())))
    }

    fn configured() -> Arc<StubRepository> {
        Arc::new(StubRepository::with_config(sample_policy(), sample_blockchain()))
    }

    #[test]
    fn test_upstream_requires_exactly_one_zcash() {
        let l1 = Instance::new("l1", InstanceType::Lwd, "p1");
        let z1 = Instance::new("z1", InstanceType::Zcash, "p1");
        let z2 = Instance::new("z2", InstanceType::Zcash, "p1");
        let l2 = Instance::new("l2", InstanceType::Lwd, "p1");

        let (zcash, previous) = LwdResourceManager::binding(&l1, std::slice::from_ref(&z1)).unwrap();
        assert_eq!(zcash.name, "z1");
        assert!(previous.is_none());
        for peers in [vec![], vec![z1, z2], vec![l2]] {
            assert!(matches!(
                LwdResourceManager::binding(&l1, &peers),
                Err(ManagerError::InvalidPeering(_))
            ));
        }
    }

    #[test]
    fn test_link_upstream_updates_zcash_gateways() {
        let l1 = Instance::new("l1", InstanceType::Lwd, "p1");
        let z1 = Instance::new("z1", InstanceType::Zcash, "p1");

        let (request, updates) = LwdResourceManager::link_upstream(&l1, &z1, None);
        assert_eq!(topology::upstream(&request), Some("z1"));
        assert_eq!(updates.len(), 1);
        assert_eq!(
            updates[0]
                .request
                .properties
                .as_zcash()
                .unwrap()
                .lwd_instance
                .as_slice(),
            ["l1"]
        );

        let mut linked = z1.clone();
        linked.request = updates[0].request.clone();
        let (_, updates) = LwdResourceManager::link_upstream(&l1, &linked, None);
        assert!(updates.is_empty());
    }

    #[tokio::test]
    async fn test_create_binds_to_zcash_peer() {
        let repo = configured();
        let l1 = Instance::new("l1", InstanceType::Lwd, "p1");
        let z1 = Instance::new("z1", InstanceType::Zcash, "p1");

        let plan = manager(&repo)
            .create_instance_resource(&Project::new("p1"), &l1, std::slice::from_ref(&z1))
            .await
            .unwrap();

        let names: Vec<&str> = plan.manifests().map(|m| m.name()).collect();
        assert_eq!(names[0], "lwd-conf-l1");
        assert_eq!(names[1], "lwd-zcash-conf-l1");
        assert_eq!(names[4], "lwd-svc-l1");
        assert_eq!(plan.manifests().last().unwrap().kind(), "HTTPProxy");

        let zcash_conf = plan
            .manifests()
            .nth(1)
            .and_then(|m| m.pointer("/data/zcash.conf"))
            .and_then(Value::as_str)
            .unwrap();
        assert!(zcash_conf.contains("rpcbind=zcashd-svc-z1.p1.svc.cluster.local"));
        assert!(zcash_conf.contains("rpcport=8232"));

        let lwd_conf = plan
            .manifests()
            .next()
            .and_then(|m| m.pointer("/data/lightwalletd.yml"))
            .and_then(Value::as_str)
            .unwrap();
        assert!(lwd_conf.contains("grpc-bind-addr: 0.0.0.0:9067"));

        assert_eq!(topology::upstream(plan.request.as_ref().unwrap()), Some("z1"));
        assert_eq!(plan.peer_updates.len(), 1);
        assert_eq!(plan.peer_updates[0].id, "z1");
        assert_eq!(
            plan.peer_updates[0]
                .request
                .properties
                .as_zcash()
                .unwrap()
                .lwd_instance
                .as_slice(),
            ["l1"]
        );
    }

    #[tokio::test]
    async fn test_create_without_upstream_fetches_nothing() {
        let repo = configured();
        let l1 = Instance::new("l1", InstanceType::Lwd, "p1");

        let err = manager(&repo)
            .create_instance_resource(&Project::new("p1"), &l1, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::InvalidPeering(_)));
        assert_eq!(repo.config_fetches(), 0);
    }

    #[tokio::test]
    async fn test_update_renders_both_configs() {
        let repo = configured();
        let l1 = running(Instance::new("l1", InstanceType::Lwd, "p1"));
        let z2 = Instance::new("z2", InstanceType::Zcash, "p1");

        let plan = manager(&repo)
            .create_update_resource(&Project::new("p1"), &l1, std::slice::from_ref(&z2))
            .await
            .unwrap();

        let kinds: Vec<&str> = plan.manifests().map(|m| m.kind()).collect();
        assert_eq!(kinds, ["ConfigMap", "ConfigMap"]);
        assert_eq!(topology::upstream(plan.request.as_ref().unwrap()), Some("z2"));
    }

    #[tokio::test]
    async fn test_rebind_drops_gateway_from_previous_upstream() {
        let repo = configured();
        let mut z1 = Instance::new("z1", InstanceType::Zcash, "p1");
        topology::add_lwd_instance(&mut z1.request, "l1");
        let z2 = Instance::new("z2", InstanceType::Zcash, "p1");
        let mut l1 = running(Instance::new("l1", InstanceType::Lwd, "p1"));
        topology::add_upstream(&mut l1.request, "z1");

        // Recorded upstream first or second, the other peer is the new one
        for peers in [vec![z2.clone(), z1.clone()], vec![z1.clone(), z2.clone()]] {
            let plan = manager(&repo)
                .create_update_resource(&Project::new("p1"), &l1, &peers)
                .await
                .unwrap();

            assert_eq!(topology::upstream(plan.request.as_ref().unwrap()), Some("z2"));
            let updated: Vec<&str> = plan.peer_updates.iter().map(|u| u.name.as_str()).collect();
            assert_eq!(updated, ["z2", "z1"]);

            let z1_gateways = &plan.peer_updates[1].request.properties.as_zcash().unwrap().lwd_instance;
            assert!(z1_gateways.is_empty());
        }
    }

    #[test]
    fn test_binding_needs_recorded_upstream_for_two_peers() {
        let mut l1 = Instance::new("l1", InstanceType::Lwd, "p1");
        topology::add_upstream(&mut l1.request, "z9");
        let peers = [
            Instance::new("z1", InstanceType::Zcash, "p1"),
            Instance::new("z2", InstanceType::Zcash, "p1"),
        ];
        assert!(matches!(
            LwdResourceManager::binding(&l1, &peers),
            Err(ManagerError::InvalidPeering(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_checks_deployment_before_config() {
        let repo = configured();
        let l1 = Instance::new("l1", InstanceType::Lwd, "p1");

        let err = manager(&repo)
            .create_stop_resource(&Project::new("p1"), &l1)
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::InvalidState(_)));
        assert_eq!(repo.config_fetches(), 0);

        let plan = manager(&repo)
            .create_stop_resource(&Project::new("p1"), &running(l1))
            .await
            .unwrap();
        assert_eq!(plan.removals.len(), 1);
        assert_eq!(plan.removals[0].name, "l1");
    }

    #[tokio::test]
    async fn test_rotation_is_empty() {
        let repo = configured();
        let l1 = Instance::new("l1", InstanceType::Lwd, "p1");
        let plan = manager(&repo)
            .create_rotation_resource(&Project::new("p1"), &l1)
            .await
            .unwrap();
        assert!(plan.is_empty());
    }
}
