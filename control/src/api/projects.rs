use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::info;
use zbi_manager::ProjectPlan;

use super::{ApiError, AppState};
use crate::types::ProjectManifestsResponse;

/// GET /api/projects/:project/manifests - Namespace and ingress for a project
pub async fn project_manifests(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> Result<Json<ProjectManifestsResponse>, ApiError> {
    let manifests = state.lifecycle.project_manifests(&project).await?;
    Ok(Json(ProjectManifestsResponse { project, manifests }))
}

/// POST /api/projects/:project/repair - Re-render namespace and ingress
pub async fn repair_project(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> Result<Json<ProjectPlan>, ApiError> {
    info!(project = %project, "Project repair request");
    Ok(Json(state.lifecycle.repair_project(&project).await?))
}

/// DELETE /api/projects/:project - Plan removal of the project and its instances
pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> Result<Json<ProjectPlan>, ApiError> {
    info!(project = %project, "Project delete request");
    Ok(Json(state.lifecycle.delete_project(&project).await?))
}
