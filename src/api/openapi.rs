//! OpenAPI document assembly.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use super::dto;
use super::handlers;
use crate::models;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "PrintBay Gateway API",
        description = "Listing ingestion and read API for the PrintBay marketplace"
    ),
    paths(
        handlers::health::health_check,
        handlers::listings::create_listing,
        handlers::listings::get_listing_by_id,
        handlers::listings::get_my_listings,
        handlers::listings::update_listing,
        handlers::listings::delete_listing,
        handlers::files::presign_upload,
    ),
    components(schemas(
        dto::CreateListingRequest,
        dto::CreateListingFile,
        dto::PrinterSettings,
        dto::UpdateListingRequest,
        dto::UpdatePrinterSettings,
        dto::ListingResponse,
        dto::ListingFileDto,
        dto::PresignRequest,
        dto::PresignResponse,
        models::Listing,
        models::ListingFile,
        models::ListingStatus,
        models::FileKind,
        models::FileStatus,
        models::Dimensions,
        handlers::health::HealthResponse,
        handlers::health::HealthChecks,
        handlers::health::CheckStatus,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Liveness and dependency probes"),
        (name = "listings", description = "Listing lifecycle"),
        (name = "files", description = "Direct-upload authorization"),
    )
)]
struct ApiDoc;

/// Build the OpenAPI document served next to the Swagger UI.
pub fn build_openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_contains_all_routes() {
        let spec = build_openapi();
        let paths = &spec.paths.paths;
        for expected in [
            "/health",
            "/listings",
            "/listings/{id}",
            "/files/presign",
        ] {
            assert!(paths.contains_key(expected), "missing path {}", expected);
        }
    }
}
