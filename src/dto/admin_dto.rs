use crate::services::queue_service::{FailedEmail, ProcessReport, QueueMetrics, QueueStats};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ListSubmissionsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubmissionRequest {
    pub status: Option<String>,
    pub admin_notes: Option<String>,
    pub converted_to_premium: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct FailedEmailsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct EmailQueueStatsResponse {
    pub stats: QueueStats,
    pub metrics: QueueMetrics,
}

#[derive(Debug, Serialize)]
pub struct FailedEmailsResponse {
    #[serde(rename = "failedEmails")]
    pub failed_emails: Vec<FailedEmail>,
}

#[derive(Debug, Serialize)]
pub struct ProcessQueueResponse {
    pub result: ProcessReport,
}
