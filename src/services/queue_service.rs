use crate::error::{Error, Result};
use crate::models::submission::{
    Submission, EMAIL_STATUS_FAILED, EMAIL_STATUS_PENDING, EMAIL_STATUS_RETRYING,
    EMAIL_STATUS_SENT, SUBMISSION_COLUMNS,
};
use crate::services::email_service::Mailer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Row};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Exponential backoff with a cap: `base * 2^(attempts-1)`, never more
/// than `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn backoff_delay(&self, attempts: i32) -> Duration {
        let exp = attempts.saturating_sub(1).clamp(0, 16) as u32;
        let secs = self
            .base_delay
            .as_secs()
            .saturating_mul(1u64 << exp)
            .min(self.max_delay.as_secs());
        Duration::from_secs(secs)
    }
}

fn state_after_failure(attempts: i32, max_attempts: i32) -> &'static str {
    if attempts >= max_attempts {
        EMAIL_STATUS_FAILED
    } else {
        EMAIL_STATUS_RETRYING
    }
}

/// Counts for one processing pass. `failed` counts delivery attempts that
/// did not go through, whether the row was rescheduled or went terminal.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct ProcessReport {
    pub sent: u32,
    pub failed: u32,
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub queued: i64,
    pub sent: i64,
    pub retrying: i64,
    pub failed: i64,
}

impl QueueStats {
    pub fn total(&self) -> i64 {
        self.pending + self.queued + self.sent + self.retrying + self.failed
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetrics {
    pub sent_last_24_hours: i64,
    pub total_failed: i64,
    pub currently_retrying: i64,
    pub due_now: i64,
    pub avg_attempts_for_success: Option<f64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FailedEmail {
    pub id: i64,
    pub public_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub email_attempts: i32,
    pub email_error: Option<String>,
    pub email_last_attempt_at: Option<DateTime<Utc>>,
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetryOutcome {
    pub sent: bool,
    pub email_status: String,
    pub error: Option<String>,
}

struct AttemptOutcome {
    delivered: bool,
    new_status: &'static str,
    error: Option<String>,
}

#[derive(Clone)]
pub struct EmailQueueService {
    pool: PgPool,
    mailer: Arc<dyn Mailer>,
    policy: RetryPolicy,
    send_timeout: Duration,
    pass_deadline: Option<Duration>,
}

impl EmailQueueService {
    pub fn new(
        pool: PgPool,
        mailer: Arc<dyn Mailer>,
        policy: RetryPolicy,
        send_timeout: Duration,
        pass_deadline: Option<Duration>,
    ) -> Self {
        Self {
            pool,
            mailer,
            policy,
            send_timeout,
            pass_deadline,
        }
    }

    /// One processing pass over every due row.
    ///
    /// Rows are claimed one at a time with `FOR UPDATE SKIP LOCKED`, so a
    /// concurrent pass skips whatever this one has in flight. A delivery
    /// failure is recorded on the row and never aborts the pass; only store
    /// errors propagate.
    pub async fn process_queue(&self) -> Result<ProcessReport> {
        let started = Instant::now();
        let mut report = ProcessReport::default();

        loop {
            if let Some(deadline) = self.pass_deadline {
                if started.elapsed() >= deadline {
                    tracing::warn!(
                        elapsed_secs = started.elapsed().as_secs(),
                        "queue pass deadline reached, leaving remaining rows for the next run"
                    );
                    break;
                }
            }

            let mut tx = self.pool.begin().await?;
            let claimed = sqlx::query_as::<_, Submission>(&format!(
                r#"SELECT {SUBMISSION_COLUMNS} FROM cv_submissions
                   WHERE email_status IN ('queued', 'retrying')
                     AND email_scheduled_at IS NOT NULL
                     AND email_scheduled_at <= NOW()
                   ORDER BY email_scheduled_at ASC
                   FOR UPDATE SKIP LOCKED
                   LIMIT 1"#
            ))
            .fetch_optional(&mut *tx)
            .await?;

            let Some(submission) = claimed else {
                break;
            };

            let outcome = self.attempt_delivery(&mut tx, &submission).await?;
            tx.commit().await?;

            if outcome.delivered {
                report.sent += 1;
            } else {
                report.failed += 1;
            }
        }

        Ok(report)
    }

    /// Single delivery attempt for an already-claimed row; records the
    /// outcome on the row but does not commit.
    async fn attempt_delivery(
        &self,
        conn: &mut PgConnection,
        submission: &Submission,
    ) -> Result<AttemptOutcome> {
        let send_result =
            tokio::time::timeout(self.send_timeout, self.mailer.send_analysis_email(submission))
                .await;
        let attempt_error = match send_result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "delivery attempt timed out after {}s",
                self.send_timeout.as_secs()
            )),
        };

        let attempts = submission.email_attempts + 1;
        match attempt_error {
            None => {
                sqlx::query(
                    r#"UPDATE cv_submissions
                       SET email_status = 'sent',
                           email_sent_at = NOW(),
                           email_attempts = $2,
                           email_last_attempt_at = NOW(),
                           email_error = NULL,
                           updated_at = NOW()
                       WHERE id = $1"#,
                )
                .bind(submission.id)
                .bind(attempts)
                .execute(&mut *conn)
                .await?;
                Ok(AttemptOutcome {
                    delivered: true,
                    new_status: EMAIL_STATUS_SENT,
                    error: None,
                })
            }
            Some(message) => {
                let new_status = state_after_failure(attempts, self.policy.max_attempts);
                tracing::warn!(
                    submission_id = submission.id,
                    attempts,
                    new_status,
                    error = %message,
                    "email delivery attempt failed"
                );
                if new_status == EMAIL_STATUS_FAILED {
                    sqlx::query(
                        r#"UPDATE cv_submissions
                           SET email_status = 'failed',
                               email_attempts = $2,
                               email_last_attempt_at = NOW(),
                               email_error = $3,
                               updated_at = NOW()
                           WHERE id = $1"#,
                    )
                    .bind(submission.id)
                    .bind(attempts)
                    .bind(&message)
                    .execute(&mut *conn)
                    .await?;
                } else {
                    let delay = self.policy.backoff_delay(attempts);
                    sqlx::query(
                        r#"UPDATE cv_submissions
                           SET email_status = 'retrying',
                               email_attempts = $2,
                               email_last_attempt_at = NOW(),
                               email_error = $3,
                               email_scheduled_at = NOW() + make_interval(secs => $4),
                               updated_at = NOW()
                           WHERE id = $1"#,
                    )
                    .bind(submission.id)
                    .bind(attempts)
                    .bind(&message)
                    .bind(delay.as_secs_f64())
                    .execute(&mut *conn)
                    .await?;
                }
                Ok(AttemptOutcome {
                    delivered: false,
                    new_status,
                    error: Some(message),
                })
            }
        }
    }

    /// Immediate single-row attempt for the admin "Retry" action. Bypasses
    /// the scheduled-time gate; valid for `failed` (the usual case) and for
    /// rows still waiting in `queued`/`retrying`.
    pub async fn retry_email(&self, submission_id: i64) -> Result<RetryOutcome> {
        let mut tx = self.pool.begin().await?;
        let claimed = sqlx::query_as::<_, Submission>(&format!(
            r#"SELECT {SUBMISSION_COLUMNS} FROM cv_submissions
               WHERE id = $1
               FOR UPDATE SKIP LOCKED"#
        ))
        .bind(submission_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(submission) = claimed else {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT id FROM cv_submissions WHERE id = $1")
                    .bind(submission_id)
                    .fetch_optional(&self.pool)
                    .await?;
            return match exists {
                Some(_) => Err(Error::Conflict(format!(
                    "Submission {} has a delivery attempt in progress",
                    submission_id
                ))),
                None => Err(Error::NotFound(format!(
                    "Submission {} not found",
                    submission_id
                ))),
            };
        };

        match submission.email_status.as_str() {
            EMAIL_STATUS_SENT => {
                return Err(Error::BadRequest(format!(
                    "Submission {} has already been emailed",
                    submission_id
                )))
            }
            EMAIL_STATUS_PENDING => {
                return Err(Error::BadRequest(format!(
                    "Submission {} has no email queued yet",
                    submission_id
                )))
            }
            _ => {}
        }

        let outcome = self.attempt_delivery(&mut tx, &submission).await?;
        tx.commit().await?;

        tracing::info!(
            submission_id,
            sent = outcome.delivered,
            "manual email retry processed"
        );
        Ok(RetryOutcome {
            sent: outcome.delivered,
            email_status: outcome.new_status.to_string(),
            error: outcome.error,
        })
    }

    pub async fn get_queue_stats(&self) -> Result<QueueStats> {
        let rows = sqlx::query(
            r#"SELECT email_status, COUNT(*) AS count
               FROM cv_submissions
               GROUP BY email_status"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.try_get("email_status")?;
            let count: i64 = row.try_get("count")?;
            match status.as_str() {
                "pending" => stats.pending = count,
                "queued" => stats.queued = count,
                "sent" => stats.sent = count,
                "retrying" => stats.retrying = count,
                "failed" => stats.failed = count,
                other => tracing::warn!(status = other, "unexpected email status in store"),
            }
        }
        Ok(stats)
    }

    pub async fn get_queue_metrics(&self) -> Result<QueueMetrics> {
        let row = sqlx::query(
            r#"SELECT
                 (SELECT COUNT(*) FROM cv_submissions
                    WHERE email_status = 'sent'
                      AND email_sent_at >= NOW() - INTERVAL '24 hours') AS sent_last_24_hours,
                 (SELECT COUNT(*) FROM cv_submissions
                    WHERE email_status = 'failed') AS total_failed,
                 (SELECT COUNT(*) FROM cv_submissions
                    WHERE email_status = 'retrying') AS currently_retrying,
                 (SELECT COUNT(*) FROM cv_submissions
                    WHERE email_status IN ('queued', 'retrying')
                      AND email_scheduled_at <= NOW()) AS due_now,
                 (SELECT AVG(email_attempts)::float8 FROM cv_submissions
                    WHERE email_status = 'sent') AS avg_attempts_for_success"#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueMetrics {
            sent_last_24_hours: row.try_get("sent_last_24_hours")?,
            total_failed: row.try_get("total_failed")?,
            currently_retrying: row.try_get("currently_retrying")?,
            due_now: row.try_get("due_now")?,
            avg_attempts_for_success: row.try_get("avg_attempts_for_success")?,
        })
    }

    pub async fn get_failed_emails(&self, limit: i64) -> Result<Vec<FailedEmail>> {
        let failed = sqlx::query_as::<_, FailedEmail>(
            r#"SELECT id, public_id, first_name, last_name, email,
                      email_attempts, email_error, email_last_attempt_at,
                      original_filename, created_at
               FROM cv_submissions
               WHERE email_status = 'failed'
               ORDER BY email_last_attempt_at DESC NULLS LAST
               LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt_until_capped() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
        };
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(30));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(60));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(120));
        assert_eq!(policy.backoff_delay(8), Duration::from_secs(3600));
        assert_eq!(policy.backoff_delay(100), Duration::from_secs(3600));
    }

    #[test]
    fn backoff_handles_zero_and_negative_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
        };
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(30));
        assert_eq!(policy.backoff_delay(-5), Duration::from_secs(30));
    }

    #[test]
    fn failure_goes_terminal_only_at_the_cap() {
        assert_eq!(state_after_failure(1, 3), "retrying");
        assert_eq!(state_after_failure(2, 3), "retrying");
        assert_eq!(state_after_failure(3, 3), "failed");
        assert_eq!(state_after_failure(4, 3), "failed");
        assert_eq!(state_after_failure(1, 1), "failed");
    }
}
