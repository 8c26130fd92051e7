use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use cv_intake_backend::services::email_service::Mailer;
use cv_intake_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    routes, AppState,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(pool)?;

    // Surface a bad SMTP setup at boot; delivery itself is retried by the
    // queue, so this is a warning rather than a startup failure.
    match app_state.email_service.verify().await {
        Ok(true) => info!("SMTP transport verified"),
        Ok(false) => tracing::warn!("SMTP transport refused the connection check"),
        Err(e) => tracing::warn!("Could not verify SMTP transport: {}", e),
    }

    let base_routes = Router::new().route("/health", get(routes::health::health));

    let public_api = Router::new()
        .route(
            "/api/cv-submissions",
            post(routes::submission_routes::upload_submission),
        )
        .route(
            "/api/track/email-open/:public_id",
            get(routes::submission_routes::track_email_open),
        )
        .layer(axum::middleware::from_fn_with_state(
            cv_intake_backend::middleware::rate_limit::new_rps_state(config.public_rps),
            cv_intake_backend::middleware::rate_limit::rps_middleware,
        ));

    let integration_api = Router::new()
        .route(
            "/api/integration/cv-submissions/:id/analysis",
            post(routes::integration::record_analysis_result),
        )
        .layer(axum::middleware::from_fn_with_state(
            cv_intake_backend::middleware::rate_limit::new_rps_state(config.admin_rps),
            cv_intake_backend::middleware::rate_limit::rps_middleware,
        ));

    let admin_api = Router::new()
        .route(
            "/api/admin/cv-submissions",
            get(routes::admin_routes::list_submissions),
        )
        .route(
            "/api/admin/cv-submissions/email-queue/stats",
            get(routes::admin_routes::email_queue_stats),
        )
        .route(
            "/api/admin/cv-submissions/email-queue/failed",
            get(routes::admin_routes::failed_emails),
        )
        .route(
            "/api/admin/cv-submissions/email-queue/process",
            post(routes::admin_routes::process_email_queue),
        )
        .route(
            "/api/admin/cv-submissions/:id",
            get(routes::admin_routes::get_submission).patch(routes::admin_routes::update_submission),
        )
        .route(
            "/api/admin/cv-submissions/:id/retry-email",
            post(routes::admin_routes::retry_email),
        )
        .layer(axum::middleware::from_fn_with_state(
            cv_intake_backend::middleware::rate_limit::new_rps_state(config.admin_rps),
            cv_intake_backend::middleware::rate_limit::rps_middleware,
        ));

    info!("Serving uploads from: {}", config.uploads_dir);

    let app = base_routes
        .merge(public_api)
        .merge(integration_api)
        .merge(admin_api)
        .nest_service(
            "/uploads",
            tower_http::services::ServeDir::new(&config.uploads_dir),
        )
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
