use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};

use crate::dto::admin_dto::{
    EmailQueueStatsResponse, FailedEmailsQuery, FailedEmailsResponse, ListSubmissionsQuery,
    ProcessQueueResponse, UpdateSubmissionRequest,
};
use crate::services::submission_service::AdminUpdate;
use crate::{error::Result, AppState};

pub async fn list_submissions(
    State(state): State<AppState>,
    Query(query): Query<ListSubmissionsQuery>,
) -> Result<impl IntoResponse> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);
    let submissions = state
        .submission_service
        .list(query.status, limit, offset)
        .await?;
    Ok(Json(submissions))
}

pub async fn get_submission(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let submission = state.submission_service.get(id).await?;
    Ok(Json(submission))
}

pub async fn update_submission(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateSubmissionRequest>,
) -> Result<impl IntoResponse> {
    let submission = state
        .submission_service
        .update_admin_fields(
            id,
            AdminUpdate {
                status: payload.status,
                admin_notes: payload.admin_notes,
                converted_to_premium: payload.converted_to_premium,
            },
        )
        .await?;
    Ok(Json(submission))
}

pub async fn email_queue_stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let stats = state.email_queue_service.get_queue_stats().await?;
    let metrics = state.email_queue_service.get_queue_metrics().await?;
    Ok(Json(EmailQueueStatsResponse { stats, metrics }))
}

pub async fn failed_emails(
    State(state): State<AppState>,
    Query(query): Query<FailedEmailsQuery>,
) -> Result<impl IntoResponse> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let failed_emails = state.email_queue_service.get_failed_emails(limit).await?;
    Ok(Json(FailedEmailsResponse { failed_emails }))
}

pub async fn process_email_queue(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let result = state.email_queue_service.process_queue().await?;
    Ok(Json(ProcessQueueResponse { result }))
}

pub async fn retry_email(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let outcome = state.email_queue_service.retry_email(id).await?;
    Ok(Json(outcome))
}
