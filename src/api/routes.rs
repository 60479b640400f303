//! Route definitions for the gateway.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers;
use super::middleware::auth::{auth_middleware, Authenticator};
use super::middleware::idempotency::{idempotency_middleware, IdempotencyStore};
use super::middleware::request_id::request_id_middleware;
use super::SharedState;

/// Overall request deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Create the main API router
pub fn create_router(
    state: SharedState,
    authenticator: Arc<Authenticator>,
    idempotency_store: Arc<IdempotencyStore>,
) -> Router {
    // Build OpenAPI spec once at startup
    let openapi = super::openapi::build_openapi();

    // Public routes: health and the buyer-facing read.
    let public = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/listings/:id", get(handlers::listings::get_listing_by_id));

    // Authenticated, idempotency-aware routes. The idempotency layer wraps
    // auth so a replayed response short-circuits before the token is
    // re-verified, exactly like the first run's cached output.
    let protected = Router::new()
        .route(
            "/listings",
            axum::routing::post(handlers::listings::create_listing)
                .get(handlers::listings::get_my_listings),
        )
        .route(
            "/listings/:id",
            axum::routing::put(handlers::listings::update_listing)
                .delete(handlers::listings::delete_listing),
        )
        .route(
            "/files/presign",
            axum::routing::post(handlers::files::presign_upload),
        )
        .layer(middleware::from_fn_with_state(
            authenticator,
            auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            idempotency_store,
            idempotency_middleware,
        ));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", openapi))
        .merge(public)
        .merge(protected)
        .layer(cors_layer(&state.config.frontend_origin))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// CORS restricted to the single frontend origin.
fn cors_layer(frontend_origin: &str) -> CorsLayer {
    let origin = match frontend_origin.parse::<HeaderValue>() {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            tracing::warn!(origin = %frontend_origin, "Invalid frontend origin, allowing any");
            AllowOrigin::any()
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("idempotency-key"),
            HeaderName::from_static("x-csrf-token"),
        ])
        .max_age(Duration::from_secs(300))
}
