use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::info;
use zbi_manager::model::EventAction;
use zbi_manager::LifecyclePlan;

use super::{ApiError, AppState};
use crate::types::ActionRequest;

/// POST /api/instances/:instance/:action - Plan a lifecycle action
pub async fn run_action(
    State(state): State<Arc<AppState>>,
    Path((instance, action)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<LifecyclePlan>, ApiError> {
    let action: EventAction = action.parse().map_err(ApiError::BadRequest)?;
    let request = parse_body(&body)?;

    info!(instance = %instance, action = %action, "Lifecycle request");

    let plan = state
        .lifecycle
        .run(&instance, action, &request)
        .await?;
    Ok(Json(plan))
}

/// Only schedule and delete_resource carry a body.
fn parse_body(body: &[u8]) -> Result<ActionRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ActionRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbi_manager::model::{ResourceObjectType, SnapshotScheduleType};

    #[test]
    fn test_parse_body() {
        assert!(parse_body(b"").unwrap().schedule.is_none());
        assert_eq!(
            parse_body(br#"{"schedule": "daily"}"#).unwrap().schedule,
            Some(SnapshotScheduleType::Daily)
        );
        assert!(matches!(
            parse_body(br#"{"schedule": "yearly"}"#),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_parse_delete_resource_body() {
        let request = parse_body(br#"{"type": "VolumeSnapshot", "name": "z1-vol01-1"}"#).unwrap();
        assert_eq!(
            request.resource_target(),
            Some((ResourceObjectType::VolumeSnapshot, "z1-vol01-1"))
        );
        assert!(parse_body(br#"{"name": "z1"}"#)
            .unwrap()
            .resource_target()
            .is_none());
        assert!(matches!(
            parse_body(br#"{"type": "Ingress", "name": "z1"}"#),
            Err(ApiError::BadRequest(_))
        ));
    }
}
