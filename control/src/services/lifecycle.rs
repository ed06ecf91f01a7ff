use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use zbi_manager::model::{EventAction, Instance, InstanceType, Project};
use zbi_manager::topology;
use zbi_manager::{
    LifecyclePlan, ManagerError, ManagerResult, Manifest, ProjectPlan, Repository,
    ResourceManagerFactory,
};

use crate::types::ActionRequest;

/// Runs lifecycle operations end to end: load the instance and its peers,
/// generate the plan, then persist topology changes and the activity.
#[derive(Clone)]
pub struct LifecycleService {
    factory: ResourceManagerFactory,
    repository: Arc<dyn Repository>,
}

impl LifecycleService {
    pub fn new(factory: ResourceManagerFactory, repository: Arc<dyn Repository>) -> Self {
        Self {
            factory,
            repository,
        }
    }

    pub fn factory(&self) -> &ResourceManagerFactory {
        &self.factory
    }

    pub async fn run(
        &self,
        instance_id: &str,
        action: EventAction,
        request: &ActionRequest,
    ) -> ManagerResult<LifecyclePlan> {
        let started = Instant::now();

        let instance = self.repository.get_instance(instance_id).await?;
        let project = self.repository.get_project(&instance.project).await?;
        let manager = self
            .factory
            .get_instance_resource_manager(instance.instance_type)?;

        let result = match action {
            EventAction::Create | EventAction::Update | EventAction::Repair => {
                let peers = self.requested_peers(&instance).await?;
                match action {
                    EventAction::Create => {
                        manager
                            .create_instance_resource(&project, &instance, &peers)
                            .await
                    }
                    EventAction::Update => {
                        manager
                            .create_update_resource(&project, &instance, &peers)
                            .await
                    }
                    _ => {
                        manager
                            .create_repair_resource(&project, &instance, &peers)
                            .await
                    }
                }
            }
            EventAction::Start => manager.create_start_resource(&project, &instance).await,
            EventAction::Stop => manager.create_stop_resource(&project, &instance).await,
            EventAction::Snapshot => manager.create_snapshot_resource(&project, &instance).await,
            EventAction::Schedule => {
                let schedule = request.schedule.ok_or_else(|| {
                    ManagerError::InvalidState("schedule action requires a schedule".to_string())
                })?;
                manager
                    .create_snapshot_schedule_resource(&project, &instance, schedule)
                    .await
            }
            EventAction::Rotate => manager.create_rotation_resource(&project, &instance).await,
            EventAction::Delete => {
                let peers = self.linked_peers(&instance).await?;
                manager
                    .create_delete_resource(&project, &instance, &peers)
                    .await
            }
            EventAction::DeleteResource => {
                let (resource_type, name) = request.resource_target().ok_or_else(|| {
                    ManagerError::InvalidState(
                        "delete_resource action requires a resource type and name".to_string(),
                    )
                })?;
                manager
                    .create_delete_resource_resource(&project, &instance, resource_type, name)
                    .await
            }
        };

        let plan = match result {
            Ok(plan) => plan,
            Err(e) => {
                warn!(instance = %instance.name, action = %action, "Lifecycle operation failed: {}", e);
                self.record_activity(&instance, action, false).await;
                return Err(e);
            }
        };

        if let Err(e) = self.persist_topology(&instance, &plan).await {
            warn!(instance = %instance.name, action = %action, "Failed to persist topology: {}", e);
            self.record_activity(&instance, action, false).await;
            return Err(e);
        }
        self.record_activity(&instance, action, true).await;

        info!(
            instance = %instance.name,
            action = %action,
            manifests = plan.manifests().count(),
            removals = plan.removals.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Lifecycle operation planned"
        );
        Ok(plan)
    }

    pub async fn project_manifests(&self, project_name: &str) -> ManagerResult<Vec<Manifest>> {
        let (project, instances) = self.load_project(project_name).await?;

        self.factory
            .get_project_resource_manager()
            .create_project_resource(&project, &instances)
            .await
    }

    pub async fn repair_project(&self, project_name: &str) -> ManagerResult<ProjectPlan> {
        let (project, instances) = self.load_project(project_name).await?;

        self.factory
            .get_project_resource_manager()
            .create_project_repair_resource(&project, &instances)
            .await
    }

    pub async fn delete_project(&self, project_name: &str) -> ManagerResult<ProjectPlan> {
        let (project, instances) = self.load_project(project_name).await?;

        Ok(self
            .factory
            .get_project_resource_manager()
            .create_project_delete_resource(&project, &instances))
    }

    async fn load_project(&self, project_name: &str) -> ManagerResult<(Project, Vec<Instance>)> {
        let project = self.repository.get_project(project_name).await?;
        let instances = self.repository.get_project_instances(project_name).await?;
        Ok((project, instances))
    }

    /// Peers named on the instance's request, resolved within its project.
    ///
    /// A lightwalletd instance without requested peers keeps its recorded
    /// upstream. When the request names a different upstream, the recorded
    /// one follows the requested peers so the rebind can unlink it.
    async fn requested_peers(&self, instance: &Instance) -> ManagerResult<Vec<Instance>> {
        if instance.instance_type != InstanceType::Lwd {
            return self
                .resolve_peers(instance, &instance.request.peers, true)
                .await;
        }

        let recorded = topology::upstream(&instance.request);
        let names: Vec<String> = if instance.request.peers.is_empty() {
            recorded.map(str::to_string).into_iter().collect()
        } else {
            instance.request.peers.clone()
        };

        let mut peers = self.resolve_peers(instance, &names, true).await?;
        if let Some(previous) = recorded.filter(|r| !names.iter().any(|n| n == r)) {
            let previous = [previous.to_string()];
            peers.extend(self.resolve_peers(instance, &previous, false).await?);
        }
        Ok(peers)
    }

    /// Every instance that references this one, for unlinking on delete.
    async fn linked_peers(&self, instance: &Instance) -> ManagerResult<Vec<Instance>> {
        let names = topology::linked_instances(instance);
        self.resolve_peers(instance, &names, false).await
    }

    async fn resolve_peers(
        &self,
        instance: &Instance,
        names: &[String],
        required: bool,
    ) -> ManagerResult<Vec<Instance>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self
            .repository
            .get_project_instances(&instance.project)
            .await?;

        let mut peers = Vec::with_capacity(names.len());
        for name in names {
            match candidates.iter().find(|c| &c.name == name) {
                Some(peer) => peers.push(peer.clone()),
                None if required => {
                    return Err(ManagerError::NotFound(format!(
                        "peer {} of instance {} in project {}",
                        name, instance.name, instance.project
                    )))
                }
                None => warn!(instance = %instance.name, peer = %name, "Linked peer no longer exists"),
            }
        }
        Ok(peers)
    }

    /// Peers first, the instance's own request last.
    async fn persist_topology(&self, instance: &Instance, plan: &LifecyclePlan) -> ManagerResult<()> {
        for update in &plan.peer_updates {
            self.repository
                .update_instance_request(&update.id, &update.request)
                .await?;
        }

        if let Some(request) = &plan.request {
            if request != &instance.request {
                self.repository
                    .update_instance_request(&instance.id, request)
                    .await?;
            }
        }
        Ok(())
    }

    async fn record_activity(&self, instance: &Instance, action: EventAction, success: bool) {
        if let Err(e) = self
            .repository
            .add_instance_activity(&instance.id, action, success)
            .await
        {
            warn!(instance = %instance.name, action = %action, "Failed to record activity: {}", e);
        }
    }
}
