use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

pub const EMAIL_STATUS_PENDING: &str = "pending";
pub const EMAIL_STATUS_QUEUED: &str = "queued";
pub const EMAIL_STATUS_SENT: &str = "sent";
pub const EMAIL_STATUS_RETRYING: &str = "retrying";
pub const EMAIL_STATUS_FAILED: &str = "failed";

pub const REVIEW_STATUSES: [&str; 5] = ["new", "reviewed", "contacted", "hired", "rejected"];

/// Column list shared by every query that hydrates a full [`Submission`].
pub const SUBMISSION_COLUMNS: &str = "id, public_id, first_name, last_name, email, phone, \
     file_path, original_filename, mime_type, extracted_text, \
     analysis_score, analysis_results, \
     email_status, email_scheduled_at, email_attempts, email_last_attempt_at, \
     email_sent_at, email_opened_at, email_error, \
     status, admin_notes, converted_to_premium, conversion_date, \
     created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Submission {
    pub id: i64,
    pub public_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub file_path: String,
    pub original_filename: String,
    pub mime_type: String,
    pub extracted_text: Option<String>,
    pub analysis_score: Option<i32>,
    pub analysis_results: Option<JsonValue>,
    pub email_status: String,
    pub email_scheduled_at: Option<DateTime<Utc>>,
    pub email_attempts: i32,
    pub email_last_attempt_at: Option<DateTime<Utc>>,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub email_opened_at: Option<DateTime<Utc>>,
    pub email_error: Option<String>,
    pub status: String,
    pub admin_notes: Option<String>,
    pub converted_to_premium: bool,
    pub conversion_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing row for the admin dashboard; leaves out the extracted text and
/// analysis payload, which can be large.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubmissionSummary {
    pub id: i64,
    pub public_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub original_filename: String,
    pub analysis_score: Option<i32>,
    pub email_status: String,
    pub email_attempts: i32,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub status: String,
    pub converted_to_premium: bool,
    pub created_at: DateTime<Utc>,
}

pub const SUBMISSION_SUMMARY_COLUMNS: &str = "id, public_id, first_name, last_name, email, \
     original_filename, analysis_score, email_status, email_attempts, email_sent_at, \
     status, converted_to_premium, created_at";
