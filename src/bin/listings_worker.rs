//! PrintBay Listings Worker - Search-Indexing Entry Point
//!
//! Consumes `IndexListing` events from the bus, composes the denormalized
//! search document and upserts it into Typesense. Horizontally scalable:
//! every instance joins the same queue group.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use bytes::Bytes;
use sqlx::PgPool;

use printbay_backend::error::Result;
use printbay_backend::events::nats::NatsBus;
use printbay_backend::events::EventBus;
use printbay_backend::indexing::{IndexingService, PgListingSource};
use printbay_backend::search::typesense::TypesenseIndex;
use printbay_backend::search::SearchIndex;
use printbay_backend::{db, telemetry, Config};

/// Queue group shared by all indexing workers.
const QUEUE_GROUP: &str = "listings-worker";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _otel_guard = telemetry::init_tracing("printbay-listings-worker");

    let config = Config::from_env()?;
    tracing::info!("Starting listings worker");

    let db_pool = db::worker_pool(&config.db_dsn).await?;
    tracing::info!("Connected to database");

    tracing::info!(endpoint = %config.nats_endpoint, "Connecting to event bus");
    let bus = Arc::new(NatsBus::connect(&config.nats_endpoint, QUEUE_GROUP).await?);

    let index: Arc<dyn SearchIndex> = Arc::new(TypesenseIndex::new(
        &config.typesense_url,
        &config.typesense_api_key,
    )?);

    // Create or sync the listings collection. A failure here is not fatal:
    // upserts against a missing collection fail transiently and retry.
    if let Err(e) = index.ensure_collection().await {
        tracing::warn!(error = %e, "Failed to ensure search collection at startup");
    }

    let service = Arc::new(IndexingService::new(
        index,
        Arc::new(PgListingSource::new(db_pool.clone())),
        config.public_files_url.clone(),
    ));

    let handler_service = service.clone();
    bus.subscribe(
        &config.events.index_listing,
        QUEUE_GROUP,
        Arc::new(move |payload: Bytes| {
            let service = handler_service.clone();
            Box::pin(async move { service.handle_message(&payload).await })
        }),
    )
    .await?;

    tracing::info!(
        subject = %config.events.index_listing,
        group = QUEUE_GROUP,
        "Worker is running and listening for events"
    );

    // Health server for the orchestrator's probes.
    let health_addr = format!("0.0.0.0:{}", config.index_worker_port);
    let health_router = Router::new()
        .route("/healthz", get(healthz))
        .with_state(db_pool.clone());

    let listener = tokio::net::TcpListener::bind(&health_addr).await?;
    tracing::info!(addr = %health_addr, "Health server listening");

    axum::serve(listener, health_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down worker");

    // Drain finishes in-flight handlers so a job is never killed halfway
    // through an upsert.
    if let Err(e) = bus.drain().await {
        tracing::error!(error = %e, "Event bus drain failed");
    }
    db_pool.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Readiness: the worker is healthy while its database answers.
async fn healthz(State(db): State<PgPool>) -> (StatusCode, &'static str) {
    let probe = sqlx::query("SELECT 1").fetch_one(&db);
    match tokio::time::timeout(Duration::from_secs(2), probe).await {
        Ok(Ok(_)) => (StatusCode::OK, "OK"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "Database unavailable"),
    }
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
