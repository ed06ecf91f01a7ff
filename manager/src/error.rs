//! Error types for the instance resource manager.

use thiserror::Error;

/// Result type alias for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors returned by the manifest pipeline and lifecycle operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("invalid peering: {0}")]
    InvalidPeering(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("configuration unavailable: {0}")]
    ConfigUnavailable(String),

    #[error("unsupported instance type: {0}")]
    UnsupportedType(String),

    #[error("invalid instance properties: {0}")]
    InvalidProperties(String),

    #[error("repository error: {0}")]
    Repository(#[from] anyhow::Error),
}

impl ManagerError {
    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ManagerError::NotFound(_) => "not_found",
            ManagerError::Template(_) => "template_error",
            ManagerError::Manifest(_) => "manifest_error",
            ManagerError::InvalidPeering(_) => "invalid_peering",
            ManagerError::InvalidState(_) => "invalid_state",
            ManagerError::ConfigUnavailable(_) => "config_unavailable",
            ManagerError::UnsupportedType(_) => "unsupported_type",
            ManagerError::InvalidProperties(_) => "invalid_properties",
            ManagerError::Repository(_) => "repository_error",
        }
    }
}

impl From<minijinja::Error> for ManagerError {
    fn from(e: minijinja::Error) -> Self {
        ManagerError::Template(e.to_string())
    }
}
