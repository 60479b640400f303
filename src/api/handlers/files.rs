//! Upload authorization handler.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};

use crate::api::dto::{PresignRequest, PresignResponse};
use crate::api::middleware::auth::AuthUser;
use crate::api::SharedState;
use crate::error::{AppError, Result};

/// Obtain a direct-upload grant for one file.
#[utoipa::path(
    post,
    path = "/files/presign",
    tag = "files",
    security(("bearer" = [])),
    request_body = PresignRequest,
    responses(
        (status = 201, description = "Upload grant issued", body = PresignResponse),
        (status = 400, description = "Unknown kind or disallowed content type"),
        (status = 401, description = "Missing or invalid token"),
    )
)]
pub async fn presign_upload(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    payload: std::result::Result<Json<PresignRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!(error = %rejection, "Invalid presign request body");
        AppError::Validation("Invalid request body".into())
    })?;

    let response = state
        .file_service
        .presign_upload(&user.id.to_string(), &request)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}
