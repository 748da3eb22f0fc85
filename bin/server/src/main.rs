use csdt_access::SystemClock;
use csdt_server::{
    app,
    auth::AppState,
    config::ServerConfig,
    db::{PgAuditLog, PgSessionStore},
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    let policy = config
        .access
        .to_policy()
        .expect("invalid access configuration");
    let session_ttl = config.session.ttl().expect("invalid session configuration");
    tracing::info!(
        session_minutes = config.session.duration_minutes,
        bypass_role = %config.access.bypass_role,
        "Loaded configuration"
    );

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    // Expired sessions are closed lazily when next presented, so there is
    // no cleanup task.
    let app_state = Arc::new(AppState::new(
        Arc::new(PgSessionStore::new(db_pool.clone())),
        Arc::new(PgAuditLog::new(db_pool)),
        Arc::new(SystemClock),
        Arc::new(policy),
        session_ttl,
    ));

    let app = app::router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
