//! PrintBay API Gateway - Main Entry Point

use std::sync::Arc;

use printbay_backend::api::middleware::auth::Authenticator;
use printbay_backend::api::middleware::idempotency::IdempotencyStore;
use printbay_backend::api::{routes, AppState};
use printbay_backend::cache::Cache;
use printbay_backend::error::Result;
use printbay_backend::events::nats::NatsBus;
use printbay_backend::events::{EventBus, EventPublisher};
use printbay_backend::services::{FileService, ListingService};
use printbay_backend::storage::s3::S3Storage;
use printbay_backend::{db, telemetry, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing (guard must live for the whole process)
    let _otel_guard = telemetry::init_tracing("printbay-gateway");

    let config = Config::from_env()?;
    tracing::info!("Starting PrintBay gateway");

    // Connect to database and run migrations
    let db_pool = db::gateway_pool(&config.db_dsn).await?;
    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations").run(&db_pool).await?;
    tracing::info!("Database migrations complete");

    // Connect to Redis
    tracing::info!(addr = %config.cache.addr, "Connecting to Redis cache");
    let cache = Cache::connect(&config.cache).await?;

    // Connect to object storage
    tracing::info!(endpoint = %config.storage.endpoint, "Connecting to object storage");
    let storage = Arc::new(S3Storage::new(&config.storage)?);

    // Connect to the event bus
    tracing::info!(endpoint = %config.nats_endpoint, "Connecting to event bus");
    let bus = Arc::new(NatsBus::connect(&config.nats_endpoint, "gateway-service").await?);
    let events = Arc::new(EventPublisher::new(bus.clone(), config.events.clone()));

    // Connect to the identity provider and prime the JWKS cache
    tracing::info!(url = %config.auth.url, "Connecting to authorization service");
    let authenticator = Arc::new(Authenticator::connect(&config.auth).await?);

    let listing_service = Arc::new(ListingService::new(
        db_pool.clone(),
        cache.clone(),
        storage.clone(),
        events.clone(),
        config.public_files_url.clone(),
    ));
    let file_service = Arc::new(FileService::new(
        storage.clone(),
        config.file_constraints.clone(),
        config.upload_window_hours,
    ));

    let idempotency_store = Arc::new(IdempotencyStore::new(cache.clone()));

    let state = Arc::new(AppState {
        config: config.clone(),
        db: db_pool.clone(),
        cache,
        listing_service,
        file_service,
    });

    let app = routes::create_router(state, authenticator, idempotency_store);

    let addr = format!("0.0.0.0:{}", config.api_port);
    tracing::info!(addr = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight requests are drained; now flush the bus and close pools.
    tracing::info!("Shutting down");
    if let Err(e) = bus.drain().await {
        tracing::error!(error = %e, "Event bus drain failed");
    }
    db_pool.close().await;

    tracing::info!("Server exited cleanly");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
