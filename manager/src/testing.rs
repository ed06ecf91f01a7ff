//! In-memory repository and sample fixtures for tests.
//!
//! Available to this crate's unit tests and, through the `dev-stubs`
//! feature, to the integration tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::model::{
    BlockchainInfo, BlockchainNodeInfo, EnvoyConfig, EventAction, ImageInfo, Instance,
    InstanceType, KubernetesResource, KvPair, PolicyInfo, Project, RequestDefaults,
    ResourceObjectType, ResourceRequest, ResourceStatus,
};
use crate::repository::Repository;

/// A recorded `add_instance_activity` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedActivity {
    pub id: String,
    pub action: EventAction,
    pub success: bool,
}

#[derive(Default)]
struct StubState {
    policy: Option<PolicyInfo>,
    blockchain: Option<BlockchainInfo>,
    projects: HashMap<String, Project>,
    instances: Vec<Instance>,
    request_updates: Vec<(String, ResourceRequest)>,
    activities: Vec<RecordedActivity>,
    failing: bool,
    failing_updates: Vec<String>,
    latency: Option<Duration>,
}

/// Repository backed by process memory. Request updates are applied to the
/// stored instances so later reads see them.
#[derive(Default)]
pub struct StubRepository {
    state: Mutex<StubState>,
    config_fetches: AtomicUsize,
}

impl StubRepository {
    /// A repository with no configuration: every config read fails.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(policy: PolicyInfo, blockchain: BlockchainInfo) -> Self {
        let repo = Self::new();
        {
            let mut state = repo.lock();
            state.policy = Some(policy);
            state.blockchain = Some(blockchain);
        }
        repo
    }

    /// Sample configuration plus one project holding `instances`.
    pub fn seeded(project: Project, instances: Vec<Instance>) -> Self {
        let repo = Self::with_config(sample_policy(), sample_blockchain());
        repo.add_project(project);
        for instance in instances {
            repo.add_instance(instance);
        }
        repo
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Make request updates for one instance id fail.
    pub fn fail_updates_for(&self, id: &str) {
        self.lock().failing_updates.push(id.to_string());
    }

    /// Delay every config fetch.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    pub fn set_policy(&self, policy: PolicyInfo) {
        self.lock().policy = Some(policy);
    }

    pub fn set_blockchain(&self, blockchain: BlockchainInfo) {
        self.lock().blockchain = Some(blockchain);
    }

    pub fn add_project(&self, project: Project) {
        self.lock().projects.insert(project.name.clone(), project);
    }

    /// Insert or replace by id.
    pub fn add_instance(&self, instance: Instance) {
        let mut state = self.lock();
        state.instances.retain(|i| i.id != instance.id);
        state.instances.push(instance);
    }

    /// Number of policy fetches, one per config load attempt.
    pub fn config_fetches(&self) -> usize {
        self.config_fetches.load(Ordering::SeqCst)
    }

    pub fn request_updates(&self) -> Vec<(String, ResourceRequest)> {
        self.lock().request_updates.clone()
    }

    pub fn activities(&self) -> Vec<RecordedActivity> {
        self.lock().activities.clone()
    }

    pub fn instance(&self, id: &str) -> Option<Instance> {
        self.lock().instances.iter().find(|i| i.id == id).cloned()
    }

    fn check_available(&self) -> Result<()> {
        if self.lock().failing {
            bail!("repository unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for StubRepository {
    async fn get_policy_info(&self) -> Result<PolicyInfo> {
        self.config_fetches.fetch_add(1, Ordering::SeqCst);
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.check_available()?;
        self.lock()
            .policy
            .clone()
            .ok_or_else(|| anyhow!("no policy configured"))
    }

    async fn get_blockchain_info(&self, name: &str) -> Result<BlockchainInfo> {
        self.check_available()?;
        self.lock()
            .blockchain
            .clone()
            .filter(|b| b.name == name)
            .ok_or_else(|| anyhow!("blockchain {} not found", name))
    }

    async fn get_project(&self, name: &str) -> Result<Project> {
        self.check_available()?;
        self.lock()
            .projects
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("project {} not found", name))
    }

    async fn get_project_instances(&self, project: &str) -> Result<Vec<Instance>> {
        self.check_available()?;
        Ok(self
            .lock()
            .instances
            .iter()
            .filter(|i| i.project == project)
            .cloned()
            .collect())
    }

    async fn get_instance(&self, id: &str) -> Result<Instance> {
        self.check_available()?;
        self.instance(id)
            .ok_or_else(|| anyhow!("instance {} not found", id))
    }

    async fn update_instance_request(&self, id: &str, request: &ResourceRequest) -> Result<()> {
        self.check_available()?;
        let mut state = self.lock();
        if state.failing_updates.iter().any(|f| f == id) {
            bail!("update of instance {} rejected", id);
        }
        let instance = state
            .instances
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| anyhow!("instance {} not found", id))?;
        instance.request = request.clone();
        state.request_updates.push((id.to_string(), request.clone()));
        Ok(())
    }

    async fn add_instance_activity(&self, id: &str, action: EventAction, success: bool) -> Result<()> {
        self.check_available()?;
        self.lock().activities.push(RecordedActivity {
            id: id.to_string(),
            action,
            success,
        });
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const ZCASH_TEMPLATE: &str = include_str!("../templates/zcash.j2");
pub const LWD_TEMPLATE: &str = include_str!("../templates/lwd.j2");
pub const APP_TEMPLATE: &str = include_str!("../templates/app.j2");
pub const PROJECT_TEMPLATE: &str = include_str!("../templates/project.j2");

pub fn sample_policy() -> PolicyInfo {
    PolicyInfo {
        storage_class: "csi".to_string(),
        snapshot_class: "csi-snap".to_string(),
        domain_name: "zbi.io".to_string(),
        certificate_name: "zbi-cert".to_string(),
        service_account: "zbi-svc".to_string(),
        informer_resync: 60,
        enable_monitor: false,
        require_authentication: true,
        envoy_config: EnvoyConfig {
            image: "envoyproxy/envoy:v1.27".to_string(),
            command: vec!["/usr/local/bin/envoy".to_string()],
            timeout: 5.0,
            access_authorization: true,
            auth_server_url: "http://auth.zbi".to_string(),
            auth_server_port: 9000,
            authentication_enabled: true,
        },
        request: RequestDefaults {
            cpu: "1".to_string(),
            memory: "2".to_string(),
            storage: "50".to_string(),
        },
    }
}

fn image(name: &str, url: &str) -> ImageInfo {
    ImageInfo {
        name: name.to_string(),
        version: String::new(),
        url: url.to_string(),
    }
}

pub fn sample_zcash_node() -> BlockchainNodeInfo {
    BlockchainNodeInfo {
        name: "zcashd".to_string(),
        node_type: InstanceType::Zcash.to_string(),
        endpoints: HashMap::new(),
        ports: BTreeMap::from([("service".to_string(), 8232), ("envoy".to_string(), 8443)]),
        images: vec![image("node", "electriccoinco/zcashd:v5.6")],
        settings: HashMap::from([
            (
                "default".to_string(),
                vec![KvPair::new("server", 1), KvPair::new("txindex", 1)],
            ),
            ("miner".to_string(), vec![KvPair::new("gen", 1)]),
            ("mainnet".to_string(), vec![KvPair::new("mainnet", 1)]),
            ("testnet".to_string(), vec![KvPair::new("testnet", 1)]),
        ]),
        properties: Default::default(),
    }
}

pub fn sample_lwd_node() -> BlockchainNodeInfo {
    BlockchainNodeInfo {
        name: "lightwalletd".to_string(),
        node_type: InstanceType::Lwd.to_string(),
        endpoints: HashMap::new(),
        ports: BTreeMap::from([
            ("service".to_string(), 9067),
            ("http".to_string(), 9068),
            ("envoy".to_string(), 8443),
        ]),
        images: vec![image("lwd", "electriccoinco/lightwalletd:v0.4")],
        settings: HashMap::new(),
        properties: Default::default(),
    }
}

pub fn sample_blockchain() -> BlockchainInfo {
    let templates = [
        ("zcash", ZCASH_TEMPLATE),
        ("lwd", LWD_TEMPLATE),
        ("app", APP_TEMPLATE),
        ("project", PROJECT_TEMPLATE),
    ]
    .into_iter()
    .map(|(key, source)| (key.to_string(), STANDARD.encode(source)))
    .collect();

    BlockchainInfo {
        name: "zcash".to_string(),
        networks: vec!["mainnet".to_string(), "testnet".to_string()],
        nodes: vec![sample_zcash_node(), sample_lwd_node()],
        templates,
    }
}

pub fn sample_project(name: &str) -> Project {
    Project {
        id: format!("{}-id", name),
        blockchain: "zcash".to_string(),
        ..Project::new(name)
    }
}

pub fn zcash_instance(name: &str, project: &str) -> Instance {
    Instance::new(name, InstanceType::Zcash, project)
}

pub fn lwd_instance(name: &str, project: &str) -> Instance {
    Instance::new(name, InstanceType::Lwd, project)
}

/// Attach a resource record of the given type, replacing any existing one.
pub fn with_resource(
    mut instance: Instance,
    resource_type: ResourceObjectType,
    name: &str,
    status: ResourceStatus,
) -> Instance {
    let record = Some(KubernetesResource::new(name, resource_type, status));
    let resources = &mut instance.resources;
    match resource_type {
        ResourceObjectType::PersistentVolumeClaim => resources.persistentvolumeclaim = record,
        ResourceObjectType::Deployment => resources.deployment = record,
        ResourceObjectType::Secret => resources.secret = record,
        ResourceObjectType::Service => resources.service = record,
        ResourceObjectType::ConfigMap => resources.configmap = record,
        ResourceObjectType::HttpProxy => resources.httpproxy = record,
        ResourceObjectType::Namespace => resources.namespace = record,
        ResourceObjectType::SnapshotSchedule => resources.snapshotschedule = record,
        ResourceObjectType::VolumeSnapshot => resources.volumesnapshot.extend(record),
        _ => {}
    }
    instance
}

/// An instance that is up: active claim, deployment and secret.
pub fn running(instance: Instance) -> Instance {
    let claim = format!("{}-vol01", instance.name);
    let name = instance.name.clone();
    let instance = with_resource(
        instance,
        ResourceObjectType::PersistentVolumeClaim,
        &claim,
        ResourceStatus::Active,
    );
    let instance = with_resource(instance, ResourceObjectType::Deployment, &name, ResourceStatus::Active);
    with_resource(
        instance,
        ResourceObjectType::Secret,
        &format!("zcashd-credentials-{}", name),
        ResourceStatus::Active,
    )
}
