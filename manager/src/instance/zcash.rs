use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{
    base_spec, current_volume_name, delete_plan, new_volume_name, random_suffix,
    require_deployment, schedule_plan, snapshot_plan, start_plan, stop_plan, volume_manifests,
    zcash_instance_host, InstanceResourceManager, LifecyclePlan, OperationTimer, PeerUpdate,
    RepairVolume, METRICS_IMAGE, NODE_IMAGE, SERVICE_PORT,
};
use crate::config_cache::{ConfigCache, ConfigSnapshot};
use crate::error::{ManagerError, ManagerResult};
use crate::manifest::Manifest;
use crate::model::{
    BlockchainNodeInfo, Credentials, EventAction, Instance, InstanceSpec, InstanceType, KvPair,
    NetworkType, Project, ResourceRequest, SnapshotScheduleType, SpecProperties,
    ZcashSpecProperties,
};
use crate::template::{
    ManifestTemplate, CREDENTIALS, DEPLOYMENT, ENVOY_CONF, INGRESS, SERVICE, ZCASH_CONF,
};
use crate::topology;

// Template keys
const ZCASH_IMAGE_KEY: &str = "Zcash";
const METRICS_IMAGE_KEY: &str = "Metrics";
const SERVICE_PORT_KEY: &str = "Service";

// Settings groups and zcash.conf keys
const DEFAULT_CONF: &str = "default";
const MINER_CONF: &str = "miner";
const MAINNET_CONF: &str = "mainnet";
const TESTNET_CONF: &str = "testnet";
const RPCPORT_PROPERTY: &str = "rpcport";
const CONNECT_PROPERTY: &str = "connect";

const USERNAME_PREFIX: &str = "zcash";

/// Full node manifests. Zcash nodes peer with any number of other zcash nodes.
pub struct ZcashResourceManager {
    cache: Arc<ConfigCache>,
}

impl ZcashResourceManager {
    pub fn new(cache: Arc<ConfigCache>) -> Self {
        Self { cache }
    }

    fn validate_peers(instance: &Instance, peers: &[Instance]) -> ManagerResult<()> {
        for peer in peers {
            if peer.instance_type != InstanceType::Zcash {
                return Err(ManagerError::InvalidPeering(format!(
                    "zcash instance {} can only peer with zcash instances, got {} ({})",
                    instance.name, peer.name, peer.instance_type
                )));
            }
            if peer.name == instance.name {
                return Err(ManagerError::InvalidPeering(format!(
                    "zcash instance {} cannot peer with itself",
                    instance.name
                )));
            }
        }
        Ok(())
    }

    /// Node configuration: settings groups, rpc port, then one connect per peer.
    pub(crate) fn zcash_conf(
        node: &BlockchainNodeInfo,
        miner: bool,
        network: NetworkType,
        namespace: &str,
        peers: &[Instance],
    ) -> ManagerResult<Vec<KvPair>> {
        let port = node.require_port(SERVICE_PORT)?;

        let mut conf = node.settings_group(DEFAULT_CONF).to_vec();
        if miner {
            conf.extend_from_slice(node.settings_group(MINER_CONF));
        }
        match network {
            NetworkType::Mainnet => conf.extend_from_slice(node.settings_group(MAINNET_CONF)),
            NetworkType::Testnet => conf.extend_from_slice(node.settings_group(TESTNET_CONF)),
            NetworkType::Regnet => {}
        }
        conf.push(KvPair::new(RPCPORT_PROPERTY, port.to_string()));

        for peer in peers {
            let host = zcash_instance_host(&peer.name, namespace);
            conf.push(KvPair::new(CONNECT_PROPERTY, format!("{}:{}", host, port)));
        }

        Ok(conf)
    }

    fn generate_credentials() -> Credentials {
        Credentials {
            username: format!("{}-{}", USERNAME_PREFIX, random_suffix(8)),
            password: Uuid::new_v4().simple().to_string(),
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
            ZCASH_IMAGE_KEY.to_string(),
            node.require_image(NODE_IMAGE)?.to_string(),
        )]);
        if let Some(metrics) = node.image_url(METRICS_IMAGE) {
            spec.images
                .insert(METRICS_IMAGE_KEY.to_string(), metrics.to_string());
        }
        spec.ports = BTreeMap::from([(
            SERVICE_PORT_KEY.to_string(),
            node.require_port(SERVICE_PORT)?,
        )]);

        Ok(spec)
    }

    fn properties(
        node: &BlockchainNodeInfo,
        project: &Project,
        instance: &Instance,
        peers: &[Instance],
    ) -> ManagerResult<SpecProperties> {
        let props = instance.request.properties.as_zcash();
        let miner = props.is_some_and(|p| p.miner);

        Ok(SpecProperties::Zcash(ZcashSpecProperties {
            zcash_conf: Self::zcash_conf(node, miner, instance.network, project.namespace(), peers)?,
            miner,
            log_level: instance
                .request
                .properties
                .log_level()
                .unwrap_or_default()
                .to_string(),
        }))
    }

    /// Symmetric peering: each peer goes on this request and this instance
    /// goes on every peer's request.
    fn link_peers(instance: &Instance, peers: &[Instance]) -> (ResourceRequest, Vec<PeerUpdate>) {
        let mut request = instance.request.clone();
        let mut updates = Vec::new();

        for peer in peers {
            topology::add_peer(&mut request, &peer.name);

            let mut peer_request = peer.request.clone();
            if topology::add_peer(&mut peer_request, &instance.name) {
                updates.push(PeerUpdate::new(peer, peer_request));
            }
        }

        (request, updates)
    }

    /// Create and repair share everything but volume identity and whether
    /// credentials are issued.
    #[allow(clippy::too_many_arguments)]
    fn provision(
        config: &ConfigSnapshot,
        template: &ManifestTemplate,
        project: &Project,
        instance: &Instance,
        peers: &[Instance],
        volume: &RepairVolume,
        issue_credentials: bool,
        action: EventAction,
    ) -> ManagerResult<LifecyclePlan> {
        let node = config.node_info(InstanceType::Zcash)?;

        let mut spec = Self::node_spec(config, node, project, instance, &volume.name)?;
        spec.properties = Self::properties(node, project, instance, peers)?;

        let sections: &[&str] = if issue_credentials {
            spec.credentials = Some(Self::generate_credentials());
            &[ZCASH_CONF, CREDENTIALS, ENVOY_CONF, DEPLOYMENT, SERVICE]
        } else {
            &[ZCASH_CONF, ENVOY_CONF, DEPLOYMENT, SERVICE]
        };

        let mut manifests = template.render_manifests(sections, &spec)?;
        manifests.extend(volume_manifests(config, project, instance, volume)?);
        manifests.push(template.render_manifest(INGRESS, &spec)?);

        let (request, peer_updates) = Self::link_peers(instance, peers);

        let mut plan = LifecyclePlan::new(action, instance).with_batch(manifests);
        plan.request = Some(request);
        plan.peer_updates = peer_updates;
        Ok(plan)
    }
}

#[async_trait]
impl InstanceResourceManager for ZcashResourceManager {
    fn instance_type(&self) -> InstanceType {
        InstanceType::Zcash
    }

    async fn create_instance_resource(
        &self,
        project: &Project,
        instance: &Instance,
        peers: &[Instance],
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("zcash.create_instance_resource", instance);
        Self::validate_peers(instance, peers)?;

        let config = self.cache.snapshot().await?;
        let template = config.templates().get_instance_template(InstanceType::Zcash)?;

        let volume = RepairVolume {
            name: new_volume_name(instance),
            reused: false,
        };

        let plan = Self::provision(
            &config,
            &template,
            project,
            instance,
            peers,
            &volume,
            true,
            EventAction::Create,
        )?;

        info!(
            instance = %instance.name,
            volume = %volume.name,
            peers = peers.len(),
            "Generated zcash instance resources"
        );
        Ok(plan)
    }

    async fn create_update_resource(
        &self,
        project: &Project,
        instance: &Instance,
        peers: &[Instance],
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("zcash.create_update_resource", instance);
        Self::validate_peers(instance, peers)?;

        let config = self.cache.snapshot().await?;
        let node = config.node_info(InstanceType::Zcash)?;
        let template = config.templates().get_instance_template(InstanceType::Zcash)?;

        let mut spec = Self::node_spec(
            &config,
            node,
            project,
            instance,
            &current_volume_name(instance),
        )?;
        spec.properties = Self::properties(node, project, instance, peers)?;

        let manifests = template.render_manifests(&[ZCASH_CONF], &spec)?;
        let (request, peer_updates) = Self::link_peers(instance, peers);

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
        let _timer = OperationTimer::start("zcash.create_start_resource", instance);
        let volume_name = super::require_claim(instance, EventAction::Start)?;

        let config = self.cache.snapshot().await?;
        let node = config.node_info(InstanceType::Zcash)?;
        let template = config.templates().get_instance_template(InstanceType::Zcash)?;

        let spec = Self::node_spec(&config, node, project, instance, &volume_name)?;
        start_plan(&template, instance, &spec)
    }

    async fn create_stop_resource(
        &self,
        project: &Project,
        instance: &Instance,
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("zcash.create_stop_resource", instance);
        let deployment = require_deployment(instance)?;

        let config = self.cache.snapshot().await?;
        let node = config.node_info(InstanceType::Zcash)?;
        let template = config.templates().get_instance_template(InstanceType::Zcash)?;

        let spec = base_spec(&config, node, project, instance, "")?;
        stop_plan(&template, instance, deployment, &spec)
    }

    async fn create_repair_resource(
        &self,
        project: &Project,
        instance: &Instance,
        peers: &[Instance],
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("zcash.create_repair_resource", instance);
        Self::validate_peers(instance, peers)?;

        let config = self.cache.snapshot().await?;
        let template = config.templates().get_instance_template(InstanceType::Zcash)?;

        let volume = RepairVolume::for_instance(instance);
        // Keep existing credentials so running clients are not locked out.
        let issue_credentials = instance.resources.active_secret().is_none();

        let plan = Self::provision(
            &config,
            &template,
            project,
            instance,
            peers,
            &volume,
            issue_credentials,
            EventAction::Repair,
        )?;

        info!(
            instance = %instance.name,
            volume = %volume.name,
            reused = volume.reused,
            "Generated zcash repair resources"
        );
        Ok(plan)
    }

    async fn create_snapshot_resource(
        &self,
        project: &Project,
        instance: &Instance,
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("zcash.create_snapshot_resource", instance);
        let config = self.cache.snapshot().await?;
        snapshot_plan(&config, project, instance)
    }

    async fn create_snapshot_schedule_resource(
        &self,
        project: &Project,
        instance: &Instance,
        schedule: SnapshotScheduleType,
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("zcash.create_snapshot_schedule_resource", instance);
        let config = self.cache.snapshot().await?;
        schedule_plan(&config, project, instance, schedule)
    }

    async fn create_rotation_resource(
        &self,
        project: &Project,
        instance: &Instance,
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("zcash.create_rotation_resource", instance);
        let config = self.cache.snapshot().await?;
        let node = config.node_info(InstanceType::Zcash)?;
        let template = config.templates().get_instance_template(InstanceType::Zcash)?;

        let mut spec = base_spec(&config, node, project, instance, "")?;
        spec.credentials = Some(Self::generate_credentials());

        let secret: Manifest = template.render_manifest(CREDENTIALS, &spec)?;

        info!(instance = %instance.name, "Rotated zcash rpc credentials");
        Ok(LifecyclePlan::new(EventAction::Rotate, instance).with_batch(vec![secret]))
    }

    async fn create_delete_resource(
        &self,
        _project: &Project,
        instance: &Instance,
        peers: &[Instance],
    ) -> ManagerResult<LifecyclePlan> {
        let _timer = OperationTimer::start("zcash.create_delete_resource", instance);
        Ok(delete_plan(instance, peers))
    }
}
