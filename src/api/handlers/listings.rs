//! Listing CRUD handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};

use crate::api::dto::{CreateListingRequest, ListingResponse, UpdateListingRequest};
use crate::api::middleware::auth::AuthUser;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::Listing;

/// Map a body-deserialization rejection onto the API error envelope.
fn bad_body(rejection: JsonRejection) -> AppError {
    tracing::warn!(error = %rejection, "Invalid request body");
    AppError::Validation(
        "Input provided was not in the format expected. Please contact support if this error persists."
            .into(),
    )
}

/// Create a listing.
#[utoipa::path(
    post,
    path = "/listings",
    tag = "listings",
    security(("bearer" = [])),
    request_body = CreateListingRequest,
    responses(
        (status = 201, description = "Listing created", body = Listing),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Missing or invalid token"),
    )
)]
pub async fn create_listing(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    payload: std::result::Result<Json<CreateListingRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = payload.map_err(bad_body)?;
    let listing = state.listing_service.create_listing(&user, &request).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

/// Read one listing. Public: no token required.
#[utoipa::path(
    get,
    path = "/listings/{id}",
    tag = "listings",
    params(("id" = String, Path, description = "Listing id")),
    responses(
        (status = 200, description = "Listing found", body = ListingResponse),
        (status = 404, description = "Listing does not exist"),
    )
)]
pub async fn get_listing_by_id(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ListingResponse>> {
    tracing::debug!(listing_id = %id, "Fetching listing by id");
    let listing = state.listing_service.get_listing(&id).await?;
    Ok(Json(listing))
}

/// List the caller's listings, newest first.
#[utoipa::path(
    get,
    path = "/listings",
    tag = "listings",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "The caller's listings", body = [ListingResponse]),
        (status = 401, description = "Missing or invalid token"),
    )
)]
pub async fn get_my_listings(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ListingResponse>>> {
    tracing::debug!(user_id = %user.id, "Fetching listings for user");
    let listings = state.listing_service.listings_for_seller(&user).await?;
    Ok(Json(listings))
}

/// Patch a listing the caller owns.
#[utoipa::path(
    put,
    path = "/listings/{id}",
    tag = "listings",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Listing id")),
    request_body = UpdateListingRequest,
    responses(
        (status = 200, description = "Listing updated", body = Listing),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Not the owner"),
        (status = 404, description = "Listing does not exist"),
    )
)]
pub async fn update_listing(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<UpdateListingRequest>, JsonRejection>,
) -> Result<Json<Listing>> {
    let Json(patch) = payload.map_err(bad_body)?;
    let listing = state
        .listing_service
        .update_listing(&user, &id, &patch)
        .await?;
    Ok(Json(listing))
}

/// Soft-delete a listing the caller owns.
#[utoipa::path(
    delete,
    path = "/listings/{id}",
    tag = "listings",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Listing id")),
    responses(
        (status = 204, description = "Listing deleted (or was never yours)"),
        (status = 401, description = "Missing or invalid token"),
    )
)]
pub async fn delete_listing(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    tracing::debug!(user_id = %user.id, listing_id = %id, "Deleting listing");
    state.listing_service.delete_listing(&user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
