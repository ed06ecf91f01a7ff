//! Interface to the remote repository that stores projects, instances and
//! cluster configuration.

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{BlockchainInfo, EventAction, Instance, PolicyInfo, Project, ResourceRequest};

#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_policy_info(&self) -> Result<PolicyInfo>;

    async fn get_blockchain_info(&self, name: &str) -> Result<BlockchainInfo>;

    async fn get_project(&self, name: &str) -> Result<Project>;

    async fn get_project_instances(&self, project: &str) -> Result<Vec<Instance>>;

    async fn get_instance(&self, id: &str) -> Result<Instance>;

    /// Persist an instance's (possibly topology-mutated) request.
    async fn update_instance_request(&self, id: &str, request: &ResourceRequest) -> Result<()>;

    async fn add_instance_activity(&self, id: &str, action: EventAction, success: bool) -> Result<()>;
}
