//! Queue state-machine tests against a real Postgres instance. Every test
//! is skipped when DATABASE_URL is not set, so the suite stays green on
//! machines without a database.

use async_trait::async_trait;
use cv_intake_backend::error::{Error, Result};
use cv_intake_backend::models::submission::Submission;
use cv_intake_backend::services::email_service::Mailer;
use cv_intake_backend::services::queue_service::{EmailQueueService, RetryPolicy};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use uuid::Uuid;

static DB_GUARD: OnceLock<tokio::sync::Mutex<()>> = OnceLock::new();

async fn db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_GUARD
        .get_or_init(|| tokio::sync::Mutex::new(()))
        .lock()
        .await
}

async fn setup_pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("skipping: DATABASE_URL not set");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    sqlx::query("DELETE FROM cv_submissions WHERE email LIKE 'qtest+%'")
        .execute(&pool)
        .await
        .expect("clean fixture rows");
    Some(pool)
}

/// Records which submissions it "sent"; can be flipped into outage mode
/// and can dawdle to force overlap between concurrent passes.
struct MockMailer {
    sent_ids: Mutex<Vec<i64>>,
    failing: AtomicBool,
    delay: Duration,
}

impl MockMailer {
    fn new(failing: bool, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            sent_ids: Mutex::new(Vec::new()),
            failing: AtomicBool::new(failing),
            delay,
        })
    }

    fn sends_for(&self, id: i64) -> usize {
        self.sent_ids
            .lock()
            .unwrap()
            .iter()
            .filter(|i| **i == id)
            .count()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn verify(&self) -> Result<bool> {
        Ok(true)
    }

    async fn send_analysis_email(&self, submission: &Submission) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Internal("simulated SMTP outage".to_string()));
        }
        self.sent_ids.lock().unwrap().push(submission.id);
        Ok(())
    }
}

fn queue_service(pool: &PgPool, mailer: Arc<MockMailer>, base_delay_secs: u64) -> EmailQueueService {
    EmailQueueService::new(
        pool.clone(),
        mailer,
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(base_delay_secs),
            max_delay: Duration::from_secs(3600),
        },
        Duration::from_secs(5),
        None,
    )
}

async fn insert_row(pool: &PgPool, email_status: &str, scheduled_offset_secs: f64) -> i64 {
    sqlx::query_scalar::<_, i64>(
        r#"INSERT INTO cv_submissions
               (first_name, last_name, email, file_path, original_filename, mime_type,
                analysis_score, analysis_results, email_status, email_scheduled_at)
           VALUES ('Queue', 'Test', $1, '/tmp/cv.pdf', 'cv.pdf', 'application/pdf',
                   80, '{"strengths":["clear layout"]}'::jsonb, $2,
                   NOW() + make_interval(secs => $3))
           RETURNING id"#,
    )
    .bind(format!("qtest+{}@example.com", Uuid::new_v4()))
    .bind(email_status)
    .bind(scheduled_offset_secs)
    .fetch_one(pool)
    .await
    .expect("insert fixture row")
}

async fn row_state(pool: &PgPool, id: i64) -> (String, i32, bool, Option<String>) {
    let row: (String, i32, Option<chrono::DateTime<chrono::Utc>>, Option<String>) =
        sqlx::query_as(
            "SELECT email_status, email_attempts, email_sent_at, email_error \
             FROM cv_submissions WHERE id = $1",
        )
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("fetch row state");
    (row.0, row.1, row.2.is_some(), row.3)
}

#[tokio::test]
async fn due_row_is_sent_and_error_cleared() {
    let _guard = db_lock().await;
    let Some(pool) = setup_pool().await else { return };

    let id = insert_row(&pool, "queued", -5.0).await;
    sqlx::query("UPDATE cv_submissions SET email_error = 'stale failure' WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .unwrap();

    let mailer = MockMailer::new(false, Duration::ZERO);
    let service = queue_service(&pool, mailer.clone(), 30);
    let report = service.process_queue().await.unwrap();

    assert!(report.sent >= 1);
    assert_eq!(mailer.sends_for(id), 1);
    let (status, attempts, sent_at_set, error) = row_state(&pool, id).await;
    assert_eq!(status, "sent");
    assert_eq!(attempts, 1);
    assert!(sent_at_set);
    assert_eq!(error, None, "email_error must be cleared on success");
}

#[tokio::test]
async fn future_scheduled_row_is_never_selected() {
    let _guard = db_lock().await;
    let Some(pool) = setup_pool().await else { return };

    let id = insert_row(&pool, "queued", 3600.0).await;

    let mailer = MockMailer::new(false, Duration::ZERO);
    let service = queue_service(&pool, mailer.clone(), 30);
    service.process_queue().await.unwrap();

    assert_eq!(mailer.sends_for(id), 0);
    let (status, attempts, sent_at_set, _) = row_state(&pool, id).await;
    assert_eq!(status, "queued");
    assert_eq!(attempts, 0);
    assert!(!sent_at_set);
}

#[tokio::test]
async fn pending_row_is_never_selected_even_when_due() {
    let _guard = db_lock().await;
    let Some(pool) = setup_pool().await else { return };

    let id = insert_row(&pool, "pending", -5.0).await;

    let mailer = MockMailer::new(false, Duration::ZERO);
    let service = queue_service(&pool, mailer.clone(), 30);
    service.process_queue().await.unwrap();

    assert_eq!(mailer.sends_for(id), 0);
    let (status, _, _, _) = row_state(&pool, id).await;
    assert_eq!(status, "pending");
}

#[tokio::test]
async fn repeated_failures_hit_the_cap_and_go_terminal() {
    let _guard = db_lock().await;
    let Some(pool) = setup_pool().await else { return };

    let id = insert_row(&pool, "queued", -5.0).await;

    // Zero backoff keeps the row due, so a single pass walks it all the
    // way to the attempt cap.
    let mailer = MockMailer::new(true, Duration::ZERO);
    let service = queue_service(&pool, mailer.clone(), 0);
    let report = service.process_queue().await.unwrap();
    assert!(report.failed >= 3);

    let (status, attempts, sent_at_set, error) = row_state(&pool, id).await;
    assert_eq!(status, "failed");
    assert_eq!(attempts, 3);
    assert!(!sent_at_set);
    assert_eq!(error.as_deref(), Some("Internal error: simulated SMTP outage"));

    // Terminal rows are excluded from later automatic passes.
    mailer.failing.store(false, Ordering::SeqCst);
    service.process_queue().await.unwrap();
    let (status, attempts, _, _) = row_state(&pool, id).await;
    assert_eq!(status, "failed");
    assert_eq!(attempts, 3);

    // ...until an operator retries explicitly.
    let outcome = service.retry_email(id).await.unwrap();
    assert!(outcome.sent);
    let (status, attempts, sent_at_set, error) = row_state(&pool, id).await;
    assert_eq!(status, "sent");
    assert_eq!(attempts, 4);
    assert!(sent_at_set);
    assert_eq!(error, None);
}

#[tokio::test]
async fn first_failure_reschedules_with_backoff() {
    let _guard = db_lock().await;
    let Some(pool) = setup_pool().await else { return };

    let id = insert_row(&pool, "queued", -5.0).await;

    let mailer = MockMailer::new(true, Duration::ZERO);
    let service = queue_service(&pool, mailer, 1800);
    service.process_queue().await.unwrap();

    let (status, attempts, _, error) = row_state(&pool, id).await;
    assert_eq!(status, "retrying");
    assert_eq!(attempts, 1);
    assert!(error.is_some());

    let scheduled_in: Option<f64> = sqlx::query_scalar(
        "SELECT EXTRACT(EPOCH FROM email_scheduled_at - NOW())::float8 \
         FROM cv_submissions WHERE id = $1",
    )
    .bind(id)
    .fetch_one(&pool)
    .await
    .unwrap();
    let secs = scheduled_in.unwrap();
    assert!(secs > 1700.0 && secs <= 1800.0, "backoff was {}s", secs);
}

#[tokio::test]
async fn concurrent_passes_send_at_most_once() {
    let _guard = db_lock().await;
    let Some(pool) = setup_pool().await else { return };

    let id = insert_row(&pool, "queued", -5.0).await;

    let mailer = MockMailer::new(false, Duration::from_millis(300));
    let a = queue_service(&pool, mailer.clone(), 30);
    let b = queue_service(&pool, mailer.clone(), 30);

    let (ra, rb) = tokio::join!(a.process_queue(), b.process_queue());
    ra.unwrap();
    rb.unwrap();

    assert_eq!(mailer.sends_for(id), 1, "row must be delivered exactly once");
    let (status, attempts, sent_at_set, _) = row_state(&pool, id).await;
    assert_eq!(status, "sent");
    assert_eq!(attempts, 1);
    assert!(sent_at_set);
}

#[tokio::test]
async fn stats_buckets_sum_to_the_row_count() {
    let _guard = db_lock().await;
    let Some(pool) = setup_pool().await else { return };

    insert_row(&pool, "pending", 0.0).await;
    insert_row(&pool, "queued", 3600.0).await;
    insert_row(&pool, "retrying", 3600.0).await;
    insert_row(&pool, "sent", -5.0).await;
    insert_row(&pool, "failed", -5.0).await;

    let mailer = MockMailer::new(false, Duration::ZERO);
    let service = queue_service(&pool, mailer, 30);
    let stats = service.get_queue_stats().await.unwrap();

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cv_submissions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stats.total(), total);
}

#[tokio::test]
async fn failed_listing_is_most_recent_first_and_capped() {
    let _guard = db_lock().await;
    let Some(pool) = setup_pool().await else { return };

    let older = insert_row(&pool, "failed", -5.0).await;
    let newer = insert_row(&pool, "failed", -5.0).await;
    sqlx::query(
        "UPDATE cv_submissions SET email_last_attempt_at = NOW() - make_interval(secs => $2), \
         email_error = 'boom' WHERE id = $1",
    )
    .bind(older)
    .bind(600.0)
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "UPDATE cv_submissions SET email_last_attempt_at = NOW(), email_error = 'boom' \
         WHERE id = $1",
    )
    .bind(newer)
    .execute(&pool)
    .await
    .unwrap();

    let mailer = MockMailer::new(false, Duration::ZERO);
    let service = queue_service(&pool, mailer, 30);

    let failed = service.get_failed_emails(100).await.unwrap();
    let pos_newer = failed.iter().position(|f| f.id == newer).unwrap();
    let pos_older = failed.iter().position(|f| f.id == older).unwrap();
    assert!(pos_newer < pos_older);

    let capped = service.get_failed_emails(1).await.unwrap();
    assert_eq!(capped.len(), 1);
}

#[tokio::test]
async fn retry_is_rejected_for_sent_and_pending_rows() {
    let _guard = db_lock().await;
    let Some(pool) = setup_pool().await else { return };

    let sent = insert_row(&pool, "sent", -5.0).await;
    let pending = insert_row(&pool, "pending", 0.0).await;

    let mailer = MockMailer::new(false, Duration::ZERO);
    let service = queue_service(&pool, mailer, 30);

    assert!(matches!(
        service.retry_email(sent).await,
        Err(Error::BadRequest(_))
    ));
    assert!(matches!(
        service.retry_email(pending).await,
        Err(Error::BadRequest(_))
    ));
    assert!(matches!(
        service.retry_email(i64::MAX).await,
        Err(Error::NotFound(_))
    ));
}
