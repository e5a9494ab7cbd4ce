//! Axum route handlers for notification creation and the admin surface.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::matching::{index_overrides, ImportanceOverride};
use crate::models::notification::{NotificationDeliveryRow, NotificationType};
use crate::notifications::admin::{
    get_notifications_grouped_by_meeting, AdminFilters, AdminNotificationsResponse,
};
use crate::notifications::builder::{create_notifications_for_meeting, BuildSummary};
use crate::notifications::deletion::{delete_notifications_for_meetings, DeletionTarget};
use crate::notifications::deliveries::list_pending_deliveries;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateNotificationsRequest {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[serde(default)]
    pub overrides: Vec<ImportanceOverride>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteNotificationsRequest {
    pub targets: Vec<DeletionTarget>,
    #[serde(rename = "type", default)]
    pub notification_type: Option<NotificationType>,
}

#[derive(Debug, Serialize)]
pub struct DeleteNotificationsResponse {
    pub deleted: u64,
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub limit: Option<i64>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/cities/:city_id/meetings/:meeting_id/notifications
pub async fn handle_create_notifications(
    State(state): State<AppState>,
    Path((city_id, meeting_id)): Path<(String, String)>,
    Json(request): Json<CreateNotificationsRequest>,
) -> Result<Json<BuildSummary>, AppError> {
    let overrides = index_overrides(&request.overrides);
    let summary = create_notifications_for_meeting(
        &state.db,
        &state.config.radii,
        &city_id,
        &meeting_id,
        request.notification_type,
        &overrides,
    )
    .await?;
    Ok(Json(summary))
}

/// GET /api/v1/admin/notifications
pub async fn handle_admin_notifications(
    State(state): State<AppState>,
    Query(filters): Query<AdminFilters>,
) -> Result<Json<AdminNotificationsResponse>, AppError> {
    let response = get_notifications_grouped_by_meeting(&state.db, &filters, Utc::now()).await?;
    Ok(Json(response))
}

/// POST /api/v1/admin/notifications/delete
pub async fn handle_delete_notifications(
    State(state): State<AppState>,
    Json(request): Json<DeleteNotificationsRequest>,
) -> Result<Json<DeleteNotificationsResponse>, AppError> {
    let deleted =
        delete_notifications_for_meetings(&state.db, &request.targets, request.notification_type)
            .await?;
    Ok(Json(DeleteNotificationsResponse { deleted }))
}

/// GET /api/v1/deliveries/pending
pub async fn handle_pending_deliveries(
    State(state): State<AppState>,
    Query(params): Query<PendingQuery>,
) -> Result<Json<Vec<NotificationDeliveryRow>>, AppError> {
    let deliveries = list_pending_deliveries(&state.db, params.limit).await?;
    Ok(Json(deliveries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_deserialization() {
        let json = serde_json::json!({
            "type": "beforeMeeting",
            "overrides": [
                {
                    "subject_id": "6f1c1d5e-8a4f-4c36-9f53-0a3d8c2b7e11",
                    "topic_importance": "high"
                }
            ]
        });
        let request: CreateNotificationsRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.notification_type, NotificationType::BeforeMeeting);
        assert_eq!(request.overrides.len(), 1);
        assert!(request.overrides[0].proximity_importance.is_none());
    }

    #[test]
    fn test_create_request_requires_type() {
        let json = serde_json::json!({ "overrides": [] });
        let result: Result<CreateNotificationsRequest, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_delete_request_type_is_optional() {
        let json = serde_json::json!({
            "targets": [{ "meeting_id": "oct21_2026", "city_id": "chania" }]
        });
        let request: DeleteNotificationsRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.targets.len(), 1);
        assert!(request.notification_type.is_none());
    }
}
