use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use crate::dto::integration_dto::AnalysisResultRequest;
use crate::{error::Result, AppState};

/// Callback from the external CV analyzer. Stores the verdict and, for a
/// first analysis, queues the candidate email.
pub async fn record_analysis_result(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<AnalysisResultRequest>,
) -> Result<impl IntoResponse> {
    crate::utils::validation::validate(&payload)?;

    let submission = state
        .submission_service
        .record_analysis(
            id,
            payload.score,
            payload.results,
            payload.send_delay_seconds.unwrap_or(0),
        )
        .await?;

    Ok(Json(submission))
}
