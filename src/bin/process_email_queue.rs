//! Single-shot email queue pass, meant to be run from cron. Exits non-zero
//! when the store or the mail transport is unreachable; per-row delivery
//! failures are recorded on the rows and reported here instead.

use anyhow::{bail, Context};
use cv_intake_backend::config::init_config;
use cv_intake_backend::database::pool::create_pool;
use cv_intake_backend::services::email_service::Mailer;
use cv_intake_backend::services::queue_service::QueueStats;
use cv_intake_backend::AppState;

fn print_stats(label: &str, stats: &QueueStats) {
    println!(
        "{}: pending={} queued={} retrying={} sent={} failed={} (total {})",
        label, stats.pending, stats.queued, stats.retrying, stats.sent, stats.failed,
        stats.total()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;

    println!("Email queue processor starting");

    let pool = create_pool().await.context("could not connect to the store")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("could not run migrations")?;

    let state = AppState::new(pool)?;

    print!("Verifying mail transport... ");
    match state.email_service.verify().await {
        Ok(true) => println!("ok"),
        Ok(false) => {
            println!("refused");
            bail!("mail transport refused the connection check");
        }
        Err(e) => {
            println!("unreachable");
            return Err(anyhow::Error::from(e).context("mail transport is unreachable"));
        }
    }

    let before = state.email_queue_service.get_queue_stats().await?;
    print_stats("Queue before", &before);

    let report = state.email_queue_service.process_queue().await?;
    println!(
        "Processed this pass: sent={} failed={}",
        report.sent, report.failed
    );

    let after = state.email_queue_service.get_queue_stats().await?;
    print_stats("Queue after", &after);

    if after.failed > 0 {
        let failed = state.email_queue_service.get_failed_emails(10).await?;
        println!("Most recent failed emails:");
        for f in failed {
            println!(
                "  #{} {} {} <{}> attempts={} error={}",
                f.id,
                f.first_name,
                f.last_name,
                f.email,
                f.email_attempts,
                f.email_error.as_deref().unwrap_or("-")
            );
        }
    }

    println!("Done");
    Ok(())
}
