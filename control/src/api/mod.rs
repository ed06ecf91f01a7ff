pub mod instances;
pub mod projects;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use zbi_manager::ManagerError;

use crate::services::LifecycleService;
use crate::types::{ErrorResponse, HealthResponse, RefreshResponse};

pub struct AppState {
    pub lifecycle: LifecycleService,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Manager(e) => match e {
                ManagerError::NotFound(_) => StatusCode::NOT_FOUND,
                ManagerError::InvalidPeering(_)
                | ManagerError::InvalidState(_)
                | ManagerError::UnsupportedType(_)
                | ManagerError::InvalidProperties(_) => StatusCode::BAD_REQUEST,
                ManagerError::ConfigUnavailable(_) | ManagerError::Repository(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ManagerError::Template(_) | ManagerError::Manifest(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Manager(e) => e.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), "Request failed: {:#}", self);
        }

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: self.code().to_string(),
            details: None,
        };
        (status, Json(body)).into_response()
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Configuration
        .route("/api/config/refresh", post(refresh_config))
        // Projects
        .route("/api/projects/:project", delete(projects::delete_project))
        .route("/api/projects/:project/manifests", get(projects::project_manifests))
        .route("/api/projects/:project/repair", post(projects::repair_project))
        // Instance lifecycle
        .route("/api/instances/:instance/:action", post(instances::run_action))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// GET /health - Health check endpoint
async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
        }),
    )
}

/// POST /api/config/refresh - Reload policy, node metadata and templates
async fn refresh_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let cache = state.lifecycle.factory().cache();
    cache.refresh().await?;

    info!(blockchain = %cache.blockchain(), "Configuration refreshed on request");
    Ok(Json(RefreshResponse {
        blockchain: cache.blockchain().to_string(),
        refreshed: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ManagerError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ManagerError::InvalidPeering("x".into()), StatusCode::BAD_REQUEST),
            (ManagerError::InvalidState("x".into()), StatusCode::BAD_REQUEST),
            (ManagerError::UnsupportedType("x".into()), StatusCode::BAD_REQUEST),
            (
                ManagerError::ConfigUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ManagerError::Repository(anyhow::anyhow!("down")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (ManagerError::Template("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
        assert_eq!(
            ApiError::BadRequest("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ApiError::from(ManagerError::InvalidPeering("x".into())).code(),
            "invalid_peering"
        );
        assert_eq!(ApiError::BadRequest("x".into()).code(), "bad_request");
    }
}
