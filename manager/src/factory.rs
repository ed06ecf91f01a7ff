//! Selects the resource manager for an instance type.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::app::AppResourceHelper;
use crate::config_cache::ConfigCache;
use crate::error::{ManagerError, ManagerResult};
use crate::instance::{InstanceResourceManager, LwdResourceManager, ZcashResourceManager};
use crate::model::InstanceType;
use crate::project::ProjectResourceHelper;

/// Holds one manager per supported instance type, all sharing one cache.
#[derive(Clone)]
pub struct ResourceManagerFactory {
    cache: Arc<ConfigCache>,
    managers: HashMap<InstanceType, Arc<dyn InstanceResourceManager>>,
    app: AppResourceHelper,
    project: ProjectResourceHelper,
}

impl ResourceManagerFactory {
    pub fn new(cache: Arc<ConfigCache>) -> Self {
        let managers: Vec<Arc<dyn InstanceResourceManager>> = vec![
            Arc::new(ZcashResourceManager::new(cache.clone())),
            Arc::new(LwdResourceManager::new(cache.clone())),
        ];
        Self::with_managers(cache, managers)
    }

    /// Build a factory over an explicit set of managers. A later manager
    /// for the same type replaces an earlier one.
    pub fn with_managers(
        cache: Arc<ConfigCache>,
        managers: Vec<Arc<dyn InstanceResourceManager>>,
    ) -> Self {
        let managers = managers
            .into_iter()
            .map(|manager| (manager.instance_type(), manager))
            .collect();

        Self {
            app: AppResourceHelper::new(cache.clone()),
            project: ProjectResourceHelper::new(cache.clone()),
            cache,
            managers,
        }
    }

    pub fn get_instance_resource_manager(
        &self,
        instance_type: InstanceType,
    ) -> ManagerResult<Arc<dyn InstanceResourceManager>> {
        debug!(instance_type = %instance_type, "Resolving instance resource manager");
        self.managers
            .get(&instance_type)
            .cloned()
            .ok_or_else(|| ManagerError::UnsupportedType(instance_type.to_string()))
    }

    /// Resolve from a wire type name such as `"zcash"`.
    pub fn resolve(&self, instance_type: &str) -> ManagerResult<Arc<dyn InstanceResourceManager>> {
        self.get_instance_resource_manager(instance_type.parse()?)
    }

    pub fn get_app_resource_manager(&self) -> &AppResourceHelper {
        &self.app
    }

    pub fn get_project_resource_manager(&self) -> &ProjectResourceHelper {
        &self.project
    }

    pub fn cache(&self) -> &Arc<ConfigCache> {
        &self.cache
    }
}
