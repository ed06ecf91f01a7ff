//! ZBI instance resource manager.
//!
//! Turns instance lifecycle operations into ordered sets of cluster
//! manifests. Configuration and templates come from a [`Repository`]
//! through the [`ConfigCache`]; the [`ResourceManagerFactory`] hands out
//! the manager for each instance type.

pub mod app;
pub mod config_cache;
pub mod error;
pub mod factory;
pub mod instance;
pub mod manifest;
pub mod model;
pub mod project;
pub mod repository;
pub mod template;
pub mod topology;

#[cfg(any(test, feature = "dev-stubs"))]
pub mod testing;

pub use app::AppResourceHelper;
pub use config_cache::{ConfigCache, ConfigSnapshot};
pub use error::{ManagerError, ManagerResult};
pub use factory::ResourceManagerFactory;
pub use instance::{InstanceResourceManager, LifecyclePlan, PeerUpdate};
pub use manifest::Manifest;
pub use project::{ProjectPlan, ProjectResourceHelper};
pub use repository::Repository;
