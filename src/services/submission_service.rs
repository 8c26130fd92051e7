use crate::error::{Error, Result};
use crate::models::submission::{
    Submission, SubmissionSummary, REVIEW_STATUSES, SUBMISSION_COLUMNS,
    SUBMISSION_SUMMARY_COLUMNS,
};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

pub struct NewSubmission {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub file_path: String,
    pub original_filename: String,
    pub mime_type: String,
    pub extracted_text: String,
}

#[derive(Debug, Default)]
pub struct AdminUpdate {
    pub status: Option<String>,
    pub admin_notes: Option<String>,
    pub converted_to_premium: Option<bool>,
}

#[derive(Clone)]
pub struct SubmissionService {
    pool: PgPool,
}

impl SubmissionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewSubmission) -> Result<Submission> {
        let submission = sqlx::query_as::<_, Submission>(&format!(
            r#"INSERT INTO cv_submissions
                   (first_name, last_name, email, phone,
                    file_path, original_filename, mime_type, extracted_text)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING {SUBMISSION_COLUMNS}"#
        ))
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(&new.file_path)
        .bind(&new.original_filename)
        .bind(&new.mime_type)
        .bind(&new.extracted_text)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            submission_id = submission.id,
            public_id = %submission.public_id,
            filename = %submission.original_filename,
            "CV submission created"
        );
        Ok(submission)
    }

    pub async fn get(&self, id: i64) -> Result<Submission> {
        let submission = sqlx::query_as::<_, Submission>(&format!(
            r#"SELECT {SUBMISSION_COLUMNS} FROM cv_submissions WHERE id = $1"#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Submission {} not found", id)))?;
        Ok(submission)
    }

    pub async fn list(
        &self,
        status: Option<String>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SubmissionSummary>> {
        if let Some(ref status) = status {
            if !REVIEW_STATUSES.contains(&status.as_str()) {
                return Err(Error::BadRequest(format!("Unknown status: {}", status)));
            }
        }

        let summaries = sqlx::query_as::<_, SubmissionSummary>(&format!(
            r#"SELECT {SUBMISSION_SUMMARY_COLUMNS} FROM cv_submissions
               WHERE ($1::text IS NULL OR status = $1)
               ORDER BY created_at DESC
               LIMIT $2 OFFSET $3"#
        ))
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(summaries)
    }

    /// Records the analyzer verdict. The first analysis also queues the
    /// result email; a re-posted analysis refreshes the payload without
    /// reopening the email pipeline.
    pub async fn record_analysis(
        &self,
        id: i64,
        score: i32,
        results: JsonValue,
        send_delay_secs: i64,
    ) -> Result<Submission> {
        let submission = sqlx::query_as::<_, Submission>(&format!(
            r#"UPDATE cv_submissions
               SET analysis_score = $2,
                   analysis_results = $3,
                   email_status = CASE WHEN email_status = 'pending'
                                       THEN 'queued' ELSE email_status END,
                   email_scheduled_at = CASE WHEN email_status = 'pending'
                                             THEN NOW() + make_interval(secs => $4)
                                             ELSE email_scheduled_at END,
                   updated_at = NOW()
               WHERE id = $1
               RETURNING {SUBMISSION_COLUMNS}"#
        ))
        .bind(id)
        .bind(score)
        .bind(&results)
        .bind(send_delay_secs as f64)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Submission {} not found", id)))?;

        tracing::info!(
            submission_id = id,
            score,
            email_status = %submission.email_status,
            "analysis results recorded"
        );
        Ok(submission)
    }

    /// Review-workflow updates from the admin panel. Touches only its own
    /// columns so it cannot race the queue service's email-field writes.
    pub async fn update_admin_fields(&self, id: i64, update: AdminUpdate) -> Result<Submission> {
        if let Some(ref status) = update.status {
            if !REVIEW_STATUSES.contains(&status.as_str()) {
                return Err(Error::BadRequest(format!("Unknown status: {}", status)));
            }
        }

        let submission = sqlx::query_as::<_, Submission>(&format!(
            r#"UPDATE cv_submissions
               SET status = COALESCE($2, status),
                   admin_notes = COALESCE($3, admin_notes),
                   converted_to_premium = COALESCE($4, converted_to_premium),
                   conversion_date = CASE WHEN $4 = TRUE AND converted_to_premium = FALSE
                                          THEN NOW() ELSE conversion_date END,
                   updated_at = NOW()
               WHERE id = $1
               RETURNING {SUBMISSION_COLUMNS}"#
        ))
        .bind(id)
        .bind(update.status)
        .bind(update.admin_notes)
        .bind(update.converted_to_premium)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Submission {} not found", id)))?;
        Ok(submission)
    }

    /// First-open stamp from the tracking pixel; later hits are no-ops.
    /// Unknown ids are ignored so the pixel endpoint stays silent.
    pub async fn mark_email_opened(&self, public_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE cv_submissions
               SET email_opened_at = NOW(), updated_at = NOW()
               WHERE public_id = $1 AND email_opened_at IS NULL"#,
        )
        .bind(public_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!(%public_id, "email open recorded");
        }
        Ok(())
    }
}
