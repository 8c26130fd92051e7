pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::services::{
    email_service::{EmailService, Mailer},
    extraction_service::TextExtractionService,
    queue_service::{EmailQueueService, RetryPolicy},
    submission_service::SubmissionService,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub uploads_dir: String,
    pub extraction_service: TextExtractionService,
    pub submission_service: SubmissionService,
    pub email_service: Arc<EmailService>,
    pub email_queue_service: EmailQueueService,
}

impl AppState {
    pub fn new(pool: PgPool) -> crate::error::Result<Self> {
        let config = crate::config::get_config();

        let extraction_service = TextExtractionService::new();
        let submission_service = SubmissionService::new(pool.clone());
        let email_service = Arc::new(EmailService::from_config(config)?);
        let email_queue_service = EmailQueueService::new(
            pool.clone(),
            email_service.clone() as Arc<dyn Mailer>,
            RetryPolicy {
                max_attempts: config.email_max_attempts,
                base_delay: Duration::from_secs(config.email_retry_base_secs),
                max_delay: Duration::from_secs(config.email_retry_max_secs),
            },
            Duration::from_secs(config.email_send_timeout_secs),
            config.email_queue_deadline_secs.map(Duration::from_secs),
        );

        Ok(Self {
            pool,
            uploads_dir: config.uploads_dir.clone(),
            extraction_service,
            submission_service,
            email_service,
            email_queue_service,
        })
    }
}
