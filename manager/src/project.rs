//! Project-level manifests: the namespace and the ingress that fans out to
//! every instance ingress in the project.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config_cache::{ConfigCache, ConfigSnapshot};
use crate::error::ManagerResult;
use crate::instance::LABEL_PROJECT;
use crate::manifest::Manifest;
use crate::model::{
    EventAction, IngressInclude, Instance, KubernetesResource, Labels, Project, ProjectSpec,
    ResourceObjectType, ResourceStatus,
};
use crate::template::{INGRESS, NAMESPACE};

/// Project-level counterpart of a lifecycle plan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPlan {
    pub action: EventAction,
    pub project: String,
    pub manifests: Vec<Manifest>,
    /// Resource records to delete, namespace last.
    pub removals: Vec<KubernetesResource>,
}

#[derive(Clone)]
pub struct ProjectResourceHelper {
    cache: Arc<ConfigCache>,
}

impl ProjectResourceHelper {
    pub fn new(cache: Arc<ConfigCache>) -> Self {
        Self { cache }
    }

    /// Namespace then ingress, with one ingress include per instance.
    pub async fn create_project_resource(
        &self,
        project: &Project,
        instances: &[Instance],
    ) -> ManagerResult<Vec<Manifest>> {
        let config = self.cache.snapshot().await?;
        let manifests = Self::project_resources(&config, project, instances)?;

        info!(
            project = %project.name,
            instances = instances.len(),
            "Generated project resources"
        );
        Ok(manifests)
    }

    /// Re-render the namespace and ingress so a drifted project converges.
    pub async fn create_project_repair_resource(
        &self,
        project: &Project,
        instances: &[Instance],
    ) -> ManagerResult<ProjectPlan> {
        let config = self.cache.snapshot().await?;
        let manifests = Self::project_resources(&config, project, instances)?;

        info!(project = %project.name, "Repairing project resources");
        Ok(ProjectPlan {
            action: EventAction::Repair,
            project: project.name.clone(),
            manifests,
            removals: Vec::new(),
        })
    }

    /// Every instance record, then the project's own records and namespace.
    /// Needs no configuration.
    pub fn create_project_delete_resource(
        &self,
        project: &Project,
        instances: &[Instance],
    ) -> ProjectPlan {
        let mut removals: Vec<KubernetesResource> = instances
            .iter()
            .flat_map(|instance| instance.resources.to_vec())
            .collect();

        let mut own = project.resources.clone();
        let namespace = own.namespace.take().unwrap_or_else(|| {
            KubernetesResource::new(
                project.namespace(),
                ResourceObjectType::Namespace,
                ResourceStatus::Active,
            )
        });
        removals.extend(own.to_vec());
        removals.push(namespace);

        info!(
            project = %project.name,
            instances = instances.len(),
            removals = removals.len(),
            "Planned project deletion"
        );
        ProjectPlan {
            action: EventAction::Delete,
            project: project.name.clone(),
            manifests: Vec::new(),
            removals,
        }
    }

    pub(crate) fn project_resources(
        config: &ConfigSnapshot,
        project: &Project,
        instances: &[Instance],
    ) -> ManagerResult<Vec<Manifest>> {
        let template = config.templates().get_project_template()?;
        let policy = config.policy();

        let spec = ProjectSpec {
            name: project.name.clone(),
            namespace: project.namespace().to_string(),
            labels: Labels::from([(LABEL_PROJECT.to_string(), project.name.clone())]),
            domain_name: policy.domain_name.clone(),
            domain_secret: policy.certificate_name.clone(),
            instances: instances
                .iter()
                .map(|instance| IngressInclude {
                    name: instance.name.clone(),
                    namespace: project.namespace().to_string(),
                    instance_type: instance.instance_type,
                })
                .collect(),
        };

        template.render_manifests(&[NAMESPACE, INGRESS], &spec)
    }
}
