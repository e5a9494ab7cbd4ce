use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::subject::ExtractedSubject;
use crate::state::AppState;
use crate::subjects::reconcile::{reconcile_subjects, ReconcileOutcome};

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub subjects: Vec<ExtractedSubject>,
}

/// POST /api/v1/cities/:city_id/meetings/:meeting_id/subjects
///
/// Merges one extraction pass into the meeting's subjects. Subjects that fail
/// individually are listed under `failed`; the rest are still written.
pub async fn handle_reconcile(
    State(state): State<AppState>,
    Path((city_id, meeting_id)): Path<(String, String)>,
    Json(request): Json<ReconcileRequest>,
) -> Result<Json<ReconcileOutcome>, AppError> {
    if request.subjects.is_empty() {
        return Err(AppError::Validation("subjects cannot be empty".to_string()));
    }

    let outcome = reconcile_subjects(&state.db, &city_id, &meeting_id, request.subjects).await?;
    Ok(Json(outcome))
}
