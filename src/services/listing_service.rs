//! Listing orchestration: validation, transactional creation with event
//! fan-out, cached reads, patch updates and soft deletes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use crate::api::dto::{
    CreateListingRequest, ListingFileDto, ListingResponse, UpdateListingRequest,
};
use crate::api::middleware::auth::AuthUser;
use crate::api::middleware::request_id::current_request_id;
use crate::cache::Cache;
use crate::error::{AppError, Result};
use crate::events::{EventPublisher, IndexListingEvent, StartFileValidationEvent};
use crate::models::{FileKind, FileStatus, Listing, ListingFile, ListingStatus, StoredDimensions};
use crate::storage::{ObjectStorage, BUCKET_PRODUCT};

/// Cached full-listing responses live this long.
const LISTING_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Lifetime of signed model download URLs.
const SIGNED_URL_TTL: Duration = Duration::from_secs(15 * 60);

/// Cache key for one listing's assembled response.
pub fn listing_cache_key(listing_id: &str) -> String {
    format!("listing:{}", listing_id)
}

/// Listing service.
pub struct ListingService {
    db: PgPool,
    cache: Cache,
    storage: Arc<dyn ObjectStorage>,
    events: Arc<EventPublisher>,
    public_files_url: String,
}

impl ListingService {
    pub fn new(
        db: PgPool,
        cache: Cache,
        storage: Arc<dyn ObjectStorage>,
        events: Arc<EventPublisher>,
        public_files_url: String,
    ) -> Self {
        Self {
            db,
            cache,
            storage,
            events,
            public_files_url,
        }
    }

    /// Create a listing and its file rows in one transaction, then fan out
    /// one validation event per file.
    ///
    /// Post-commit publish failures are logged, never surfaced: a sweeper or
    /// a user-initiated retry re-emits them.
    pub async fn create_listing(
        &self,
        user: &AuthUser,
        req: &CreateListingRequest,
    ) -> Result<Listing> {
        tracing::info!(user_id = %user.id, title = %req.title, "Creating listing");

        validate_create_listing(req, &user.id.to_string())?;

        let trace_id = current_request_id().unwrap_or_default();
        let dimensions_json = req
            .dimensions
            .map(|d| serde_json::to_value(StoredDimensions::from(d)))
            .transpose()
            .map_err(|e| AppError::Validation(format!("Invalid dimensions: {}", e)))?;

        let nozzle_temp = req
            .printer_settings
            .recommended_nozzle_temp_c
            .map(|t| t as i32);
        let ai_model_name = req
            .ai_model_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let mut tx = self.db.begin().await?;

        let listing = sqlx::query_as::<_, Listing>(
            r#"
            INSERT INTO listings (
                seller_id, seller_name, seller_username,
                title, description, price_min_unit, currency, categories, license,
                client_id, trace_id, thumbnail_path, status,
                is_remixing_allowed, is_physical,
                is_assembly_required, is_hardware_required, hardware_required,
                is_multicolor, dimensions_mm, recommended_nozzle_temp_c,
                recommended_materials, is_ai_generated, ai_model_name, is_nsfw
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25
            )
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(req.title.trim())
        .bind(req.description.trim())
        .bind(req.price_min_unit)
        .bind(req.currency.to_lowercase())
        .bind(&req.categories)
        .bind(req.license.trim())
        .bind(&user.authorized_party)
        .bind(&trace_id)
        .bind(&req.files[0].path)
        .bind(ListingStatus::PendingValidation)
        .bind(req.is_remixing_allowed)
        .bind(req.is_physical)
        .bind(req.printer_settings.is_assembly_required)
        .bind(req.printer_settings.is_hardware_required)
        .bind(
            req.printer_settings
                .hardware_required
                .clone()
                .unwrap_or_default(),
        )
        .bind(req.printer_settings.is_multicolor)
        .bind(&dimensions_json)
        .bind(nozzle_temp)
        .bind(
            req.printer_settings
                .recommended_materials
                .clone()
                .unwrap_or_default(),
        )
        .bind(req.is_ai_generated)
        .bind(ai_model_name)
        .bind(req.is_nsfw)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create listing");
            e
        })?;

        let mut pending_events = Vec::with_capacity(req.files.len());
        for file in &req.files {
            // Validation already bounded kinds; this keeps the DB write honest.
            let kind = FileKind::parse(&file.kind).ok_or_else(|| {
                AppError::Validation(format!("Unsupported file type: {}", file.kind))
            })?;

            let record = sqlx::query_as::<_, ListingFile>(
                r#"
                INSERT INTO listing_files (listing_id, file_path, file_type, file_size, status, is_generated)
                VALUES ($1, $2, $3, $4, $5, FALSE)
                RETURNING *
                "#,
            )
            .bind(listing.id)
            .bind(&file.path)
            .bind(kind)
            .bind(file.size)
            .bind(FileStatus::Pending)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to save listing file");
                e
            })?;

            pending_events.push(StartFileValidationEvent {
                listing_id: listing.id.to_string(),
                user_id: user.id.to_string(),
                trace_id: trace_id.clone(),
                file_id: record.id.to_string(),
                file_key: record.file_path.clone(),
                file_type: kind.as_wire().to_string(),
            });
        }

        tx.commit().await?;

        tracing::debug!(count = pending_events.len(), "Publishing file validation events");
        for event in &pending_events {
            if let Err(e) = self.events.raise_start_file_validation(event).await {
                tracing::error!(
                    file_id = %event.file_id,
                    file_type = %event.file_type,
                    listing_id = %event.listing_id,
                    error = %e,
                    "Failed to publish file validation event"
                );
            }
        }

        Ok(listing)
    }

    /// Read one listing, cache-aside with a detached cache fill.
    pub async fn get_listing(&self, listing_id: &str) -> Result<ListingResponse> {
        let cache_key = listing_cache_key(listing_id);

        match self.cache.get_json::<ListingResponse>(&cache_key).await {
            Ok(Some(cached)) => {
                tracing::debug!(listing_id = %listing_id, "Listing served from cache");
                return Ok(cached);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(listing_id = %listing_id, error = %e, "Cache read failed");
            }
        }

        let id = Uuid::parse_str(listing_id)
            .map_err(|_| AppError::Validation("Invalid listing ID provided".into()))?;

        let listing = self
            .fetch_listing(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Listing not found".into()))?;
        let files = self.fetch_files(&[id]).await?.remove(&id).unwrap_or_default();

        let response = assemble_response(
            listing,
            files,
            self.storage.as_ref(),
            &self.public_files_url,
        )
        .await;

        // Fill the cache off the request path; a slow write must not delay
        // the response.
        let cache = self.cache.clone();
        let to_cache = response.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.set_json(&cache_key, &to_cache, LISTING_CACHE_TTL).await {
                tracing::debug!(error = %e, "Failed to cache listing response");
            }
        });

        Ok(response)
    }

    /// All of a seller's listings, newest first. Reads the DB directly, so
    /// updates are visible immediately.
    pub async fn listings_for_seller(&self, user: &AuthUser) -> Result<Vec<ListingResponse>> {
        let listings = sqlx::query_as::<_, Listing>(
            r#"
            SELECT * FROM listings
            WHERE seller_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .bind(user.id)
        .fetch_all(&self.db)
        .await?;

        let ids: Vec<Uuid> = listings.iter().map(|l| l.id).collect();
        let mut files_by_listing = self.fetch_files(&ids).await?;

        let mut responses = Vec::with_capacity(listings.len());
        for listing in listings {
            let files = files_by_listing.remove(&listing.id).unwrap_or_default();
            responses.push(
                assemble_response(listing, files, self.storage.as_ref(), &self.public_files_url)
                    .await,
            );
        }
        Ok(responses)
    }

    /// Patch a listing. Only the owner may update; absent fields stay
    /// unchanged. Invalidates the cached response and requests a re-index.
    pub async fn update_listing(
        &self,
        user: &AuthUser,
        listing_id: &str,
        patch: &UpdateListingRequest,
    ) -> Result<Listing> {
        let id = Uuid::parse_str(listing_id)
            .map_err(|_| AppError::Validation("Invalid listing ID provided".into()))?;

        let existing = self
            .fetch_listing(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Listing not found".into()))?;

        if existing.seller_id != user.id {
            return Err(AppError::Unauthorized("You do not own this listing".into()));
        }

        let updated = apply_update(existing, patch)?;

        let listing = sqlx::query_as::<_, Listing>(
            r#"
            UPDATE listings SET
                title = $2, description = $3, price_min_unit = $4, currency = $5,
                categories = $6, license = $7, thumbnail_path = $8,
                is_remixing_allowed = $9, is_physical = $10, total_weight_grams = $11,
                is_assembly_required = $12, is_hardware_required = $13,
                hardware_required = $14, is_multicolor = $15, dimensions_mm = $16,
                recommended_nozzle_temp_c = $17, recommended_materials = $18,
                is_ai_generated = $19, ai_model_name = $20, is_nsfw = $21,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(updated.id)
        .bind(&updated.title)
        .bind(&updated.description)
        .bind(updated.price_min_unit)
        .bind(&updated.currency)
        .bind(&updated.categories)
        .bind(&updated.license)
        .bind(&updated.thumbnail_path)
        .bind(updated.is_remixing_allowed)
        .bind(updated.is_physical)
        .bind(updated.total_weight_grams)
        .bind(updated.is_assembly_required)
        .bind(updated.is_hardware_required)
        .bind(&updated.hardware_required)
        .bind(updated.is_multicolor)
        .bind(&updated.dimensions_mm)
        .bind(updated.recommended_nozzle_temp_c)
        .bind(&updated.recommended_materials)
        .bind(updated.is_ai_generated)
        .bind(&updated.ai_model_name)
        .bind(updated.is_nsfw)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            tracing::error!(listing_id = %listing_id, error = %e, "Failed to update listing");
            e
        })?;

        if let Err(e) = self.cache.del(&listing_cache_key(listing_id)).await {
            tracing::warn!(listing_id = %listing_id, error = %e, "Failed to invalidate listing cache");
        }

        let event = IndexListingEvent {
            listing_id: listing_id.to_string(),
            trace_id: current_request_id().unwrap_or_default(),
        };
        if let Err(e) = self.events.raise_index_listing(&event).await {
            // Non-critical: the next update or the sweeper re-emits.
            tracing::error!(listing_id = %listing_id, error = %e, "Failed to raise re-index event");
        }

        Ok(listing)
    }

    /// Soft-delete a listing the caller owns. Deleting someone else's
    /// listing (or a missing one) is a silent no-op.
    pub async fn delete_listing(&self, user: &AuthUser, listing_id: &str) -> Result<()> {
        let id = Uuid::parse_str(listing_id)
            .map_err(|_| AppError::Validation("Invalid listing ID provided".into()))?;

        sqlx::query(
            r#"
            UPDATE listings SET deleted_at = now()
            WHERE id = $1 AND seller_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(user.id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn fetch_listing(&self, id: Uuid) -> Result<Option<Listing>> {
        let listing = sqlx::query_as::<_, Listing>(
            "SELECT * FROM listings WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(listing)
    }

    async fn fetch_files(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<ListingFile>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let files = sqlx::query_as::<_, ListingFile>(
            r#"
            SELECT * FROM listing_files
            WHERE listing_id = ANY($1) AND deleted_at IS NULL
            ORDER BY created_at
            "#,
        )
        .bind(ids)
        .fetch_all(&self.db)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<ListingFile>> = HashMap::new();
        for file in files {
            grouped.entry(file.listing_id).or_default().push(file);
        }
        Ok(grouped)
    }
}

// ---------------------------------------------------------------------------
// Pure helpers (no I/O, testable in isolation)
// ---------------------------------------------------------------------------

/// Compose a public-bucket URL with exactly one slash between base and path.
pub fn public_file_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Path ownership check. Keys look like
/// `YYYY/MM/DD/{userId}/{draftId}/{kind}/{file}`; the user segment must match
/// the caller.
pub fn check_user_owns_file(user_id: &str, file_path: &str) -> bool {
    let parts: Vec<&str> = file_path.splitn(6, '/').collect();
    if parts.len() < 6 {
        return false;
    }
    parts[3] == user_id
}

/// Validate a create request against the full rule set.
pub fn validate_create_listing(req: &CreateListingRequest, user_id: &str) -> Result<()> {
    let title_len = req.title.trim().chars().count();
    if !(5..=100).contains(&title_len) {
        return Err(AppError::Validation(
            "Title must be between 5 and 100 characters".into(),
        ));
    }

    let desc_len = req.description.trim().chars().count();
    if desc_len < 20 {
        return Err(AppError::Validation(
            "Description must be at least 20 characters".into(),
        ));
    }
    if desc_len > 5000 {
        return Err(AppError::Validation(
            "Description cannot exceed 5000 characters".into(),
        ));
    }

    if req.categories.is_empty() {
        return Err(AppError::Validation(
            "At least one category is required".into(),
        ));
    }

    if req.license.trim().is_empty() {
        return Err(AppError::Validation(
            "A valid license type is required".into(),
        ));
    }

    if req.price_min_unit < 0 {
        return Err(AppError::Validation("Price cannot be negative".into()));
    }

    // Currency only matters once money changes hands.
    if req.price_min_unit > 0 && !matches!(req.currency.to_lowercase().as_str(), "usd" | "gbp") {
        return Err(AppError::Validation(
            "Currency must be 'usd' or 'gbp'".into(),
        ));
    }

    if let Some(dims) = &req.dimensions {
        if dims.x < 0.0 || dims.y < 0.0 || dims.z < 0.0 {
            return Err(AppError::Validation("Dimensions cannot be negative".into()));
        }
    }

    if let Some(temp) = req.printer_settings.recommended_nozzle_temp_c {
        // Sanity range for consumer FDM printing.
        if !(180.0..=450.0).contains(&temp) {
            return Err(AppError::Validation(
                "Recommended nozzle temperature must be within a realistic range (180-450C)".into(),
            ));
        }
    }

    for list in [
        &req.printer_settings.recommended_materials,
        &req.printer_settings.hardware_required,
    ]
    .into_iter()
    .flatten()
    {
        if list.iter().any(|entry| entry.trim().is_empty()) {
            return Err(AppError::Validation(
                "Material and hardware lists cannot contain empty entries".into(),
            ));
        }
    }

    if req.is_ai_generated
        && req
            .ai_model_name
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .is_empty()
    {
        return Err(AppError::Validation(
            "AI Model Name is required for AI-generated content".into(),
        ));
    }

    if req.files.is_empty() {
        return Err(AppError::Validation("At least one file is required".into()));
    }

    let mut has_model = false;
    let mut has_image = false;

    for file in &req.files {
        if !check_user_owns_file(user_id, &file.path) {
            tracing::warn!(
                user_id = %user_id,
                path = %file.path,
                "Rejected file path not owned by caller"
            );
            return Err(AppError::Validation(
                "You do not have permission to use this file".into(),
            ));
        }

        if file.path.is_empty() {
            return Err(AppError::Validation("File path cannot be empty".into()));
        }
        if file.size <= 0 {
            return Err(AppError::Validation("File size must be positive".into()));
        }

        match FileKind::parse(&file.kind) {
            Some(FileKind::Model) => has_model = true,
            Some(FileKind::Image) => has_image = true,
            None => {
                return Err(AppError::Validation(format!(
                    "Invalid file type '{}'. Must be 'model' or 'image'",
                    file.kind
                )))
            }
        }
    }

    if !has_model {
        return Err(AppError::Validation(
            "You must upload at least one 3D model file".into(),
        ));
    }
    if !has_image {
        return Err(AppError::Validation(
            "You must upload at least one gallery image".into(),
        ));
    }

    Ok(())
}

/// Apply a patch to an existing listing, re-running the create-time
/// per-field validators for every field that is present.
pub fn apply_update(mut listing: Listing, patch: &UpdateListingRequest) -> Result<Listing> {
    if let Some(title) = &patch.title {
        let len = title.trim().chars().count();
        if !(5..=100).contains(&len) {
            return Err(AppError::Validation(
                "Title must be between 5 and 100 characters".into(),
            ));
        }
        listing.title = title.trim().to_string();
    }

    if let Some(description) = &patch.description {
        let len = description.trim().chars().count();
        if !(20..=5000).contains(&len) {
            return Err(AppError::Validation(
                "Description must be between 20 and 5000 characters".into(),
            ));
        }
        listing.description = description.trim().to_string();
    }

    if let Some(categories) = &patch.categories {
        if categories.is_empty() {
            return Err(AppError::Validation(
                "At least one category is required".into(),
            ));
        }
        listing.categories = categories.clone();
    }

    if let Some(license) = &patch.license {
        if license.trim().is_empty() {
            return Err(AppError::Validation(
                "A valid license type is required".into(),
            ));
        }
        listing.license = license.trim().to_string();
    }

    if let Some(price) = patch.price_min_unit {
        if price < 0 {
            return Err(AppError::Validation("Price cannot be negative".into()));
        }
        listing.price_min_unit = price;
    }

    if let Some(currency) = &patch.currency {
        listing.currency = currency.to_lowercase();
    }

    if listing.price_min_unit > 0 && !matches!(listing.currency.as_str(), "usd" | "gbp") {
        return Err(AppError::Validation(
            "Currency must be 'usd' or 'gbp'".into(),
        ));
    }

    if let Some(dims) = patch.dimensions {
        if dims.x < 0.0 || dims.y < 0.0 || dims.z < 0.0 {
            return Err(AppError::Validation("Dimensions cannot be negative".into()));
        }
        listing.dimensions_mm = Some(
            serde_json::to_value(StoredDimensions::from(dims))
                .map_err(|e| AppError::Validation(format!("Invalid dimensions format: {}", e)))?,
        );
    }

    if let Some(flag) = patch.is_remixing_allowed {
        listing.is_remixing_allowed = flag;
    }
    if let Some(flag) = patch.is_physical {
        listing.is_physical = flag;
    }
    if let Some(flag) = patch.is_nsfw {
        listing.is_nsfw = flag;
    }
    if let Some(flag) = patch.is_ai_generated {
        listing.is_ai_generated = flag;
    }

    if let Some(name) = &patch.ai_model_name {
        // An empty string clears the disclosure.
        let trimmed = name.trim();
        listing.ai_model_name = (!trimmed.is_empty()).then(|| trimmed.to_string());
    }

    if let Some(settings) = &patch.printer_settings {
        if let Some(flag) = settings.is_assembly_required {
            listing.is_assembly_required = flag;
        }
        if let Some(flag) = settings.is_hardware_required {
            listing.is_hardware_required = flag;
        }
        if let Some(flag) = settings.is_multicolor {
            listing.is_multicolor = flag;
        }
        if let Some(hardware) = &settings.hardware_required {
            if hardware.iter().any(|entry| entry.trim().is_empty()) {
                return Err(AppError::Validation(
                    "Material and hardware lists cannot contain empty entries".into(),
                ));
            }
            listing.hardware_required = hardware.clone();
        }
        if let Some(materials) = &settings.recommended_materials {
            if materials.iter().any(|entry| entry.trim().is_empty()) {
                return Err(AppError::Validation(
                    "Material and hardware lists cannot contain empty entries".into(),
                ));
            }
            listing.recommended_materials = materials.clone();
        }
        if let Some(temp) = settings.recommended_nozzle_temp_c {
            if !(180.0..=450.0).contains(&temp) {
                return Err(AppError::Validation(
                    "Recommended nozzle temperature must be within a realistic range (180-450C)"
                        .into(),
                ));
            }
            listing.recommended_nozzle_temp_c = Some(temp as i32);
        }
    }

    if listing.is_ai_generated && listing.ai_model_name.is_none() {
        return Err(AppError::Validation(
            "AI Model Name is required for AI-generated content".into(),
        ));
    }

    Ok(listing)
}

/// Build the read-path response for a listing and its files.
///
/// Files that have not passed validation keep their metadata but lose their
/// path. Validated models get a short-lived signed URL from the private
/// bucket; validated images get a permanent public URL the browser can cache.
pub async fn assemble_response(
    listing: Listing,
    files: Vec<ListingFile>,
    storage: &dyn ObjectStorage,
    public_files_url: &str,
) -> ListingResponse {
    let mut file_dtos = Vec::with_capacity(files.len());

    for file in files {
        let file_path = if file.status != FileStatus::Valid {
            None
        } else {
            match file.file_type {
                FileKind::Model => {
                    match storage
                        .presign_get(BUCKET_PRODUCT, &file.file_path, SIGNED_URL_TTL)
                        .await
                    {
                        Ok(url) => Some(url),
                        Err(e) => {
                            tracing::error!(file_id = %file.id, error = %e, "Failed to sign model URL");
                            None
                        }
                    }
                }
                FileKind::Image => Some(public_file_url(public_files_url, &file.file_path)),
            }
        };

        file_dtos.push(ListingFileDto {
            id: file.id.to_string(),
            file_path,
            file_type: file.file_type,
            status: file.status,
            size: file.file_size,
            metadata: file.metadata,
            error_message: file.error_message,
            is_generated: file.is_generated,
            source_file_id: file.source_file_id.map(|id| id.to_string()),
        });
    }

    let dims = listing.dimensions();

    ListingResponse {
        id: listing.id.to_string(),

        seller_id: listing.seller_id.to_string(),
        seller_name: listing.seller_name,
        seller_username: listing.seller_username,
        seller_verified: listing.seller_verified,

        title: listing.title,
        description: listing.description,
        price_min_unit: listing.price_min_unit,
        currency: listing.currency,
        categories: listing.categories,
        license: listing.license,

        thumbnail_path: listing
            .thumbnail_path
            .as_deref()
            .map(|path| public_file_url(public_files_url, path)),
        files: file_dtos,

        is_remixing_allowed: listing.is_remixing_allowed,
        parent_listing_id: listing.parent_listing_id.map(|id| id.to_string()),

        is_physical: listing.is_physical,
        total_weight_grams: listing.total_weight_grams,

        dim_x_mm: dims.map(|d| d.width),
        dim_y_mm: dims.map(|d| d.depth),
        dim_z_mm: dims.map(|d| d.height),

        is_assembly_required: listing.is_assembly_required,
        is_hardware_required: listing.is_hardware_required,
        hardware_required: listing.hardware_required,

        is_multicolor: listing.is_multicolor,
        recommended_materials: listing.recommended_materials,
        recommended_nozzle_temp_c: listing.recommended_nozzle_temp_c,

        is_ai_generated: listing.is_ai_generated,
        ai_model_name: listing.ai_model_name,

        is_nsfw: listing.is_nsfw,

        likes_count: listing.likes_count,
        downloads_count: listing.downloads_count,
        comments_count: listing.comments_count,

        is_sale_active: listing.is_sale_active,
        sale_name: listing.sale_name,
        sale_end_timestamp: listing.sale_end_timestamp,

        status: serde_json::to_value(listing.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "UNKNOWN".to_string()),
        created_at: listing.created_at,
        updated_at: listing.updated_at,
        last_indexed_at: listing.last_indexed_at,
        deleted_at: listing.deleted_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dto::{CreateListingFile, PrinterSettings};
    use crate::storage::{Bucket, ObjectStream, UploadGrant, UploadGrantConfig};
    use async_trait::async_trait;
    use chrono::Utc;

    const USER: &str = "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11";

    fn owned_path(kind: &str, name: &str) -> String {
        format!("2025/01/01/{}/draft-1/{}/{}", USER, kind, name)
    }

    fn valid_request() -> CreateListingRequest {
        CreateListingRequest {
            title: "Articulated Dragon".into(),
            description: "A print-in-place dragon with twenty joints".into(),
            categories: vec!["artistic".into()],
            license: "standard".into(),
            price_min_unit: 0,
            currency: "gbp".into(),
            is_free: true,
            printer_settings: PrinterSettings::default(),
            dimensions: None,
            is_nsfw: false,
            is_physical: true,
            is_ai_generated: false,
            ai_model_name: None,
            is_remixing_allowed: true,
            files: vec![
                CreateListingFile {
                    kind: "model".into(),
                    path: owned_path("models", "abcd.stl"),
                    size: 1024,
                },
                CreateListingFile {
                    kind: "image".into(),
                    path: owned_path("images", "efgh.png"),
                    size: 500,
                },
            ],
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(validate_create_listing(&valid_request(), USER).is_ok());
    }

    #[test]
    fn title_bounds_are_enforced() {
        let mut req = valid_request();
        req.title = "abcd".into();
        assert!(validate_create_listing(&req, USER).is_err());
        req.title = "a".repeat(101);
        assert!(validate_create_listing(&req, USER).is_err());
        req.title = "a".repeat(100);
        assert!(validate_create_listing(&req, USER).is_ok());
    }

    #[test]
    fn priced_listing_requires_supported_currency() {
        let mut req = valid_request();
        req.price_min_unit = 1050;
        req.currency = "eur".into();
        assert!(validate_create_listing(&req, USER).is_err());
        req.currency = "USD".into();
        assert!(validate_create_listing(&req, USER).is_ok());
        // Free listings skip the currency gate entirely
        req.price_min_unit = 0;
        req.currency = "eur".into();
        assert!(validate_create_listing(&req, USER).is_ok());
    }

    #[test]
    fn negative_price_is_rejected() {
        let mut req = valid_request();
        req.price_min_unit = -1;
        assert!(validate_create_listing(&req, USER).is_err());
    }

    #[test]
    fn ai_disclosure_requires_model_name() {
        let mut req = valid_request();
        req.is_ai_generated = true;
        req.ai_model_name = Some("".into());
        assert!(validate_create_listing(&req, USER).is_err());
        req.ai_model_name = Some("  ".into());
        assert!(validate_create_listing(&req, USER).is_err());
        req.ai_model_name = Some("TripoSR".into());
        assert!(validate_create_listing(&req, USER).is_ok());
    }

    #[test]
    fn foreign_file_path_is_rejected() {
        let mut req = valid_request();
        req.files[0].path =
            "2025/01/01/11111111-2222-3333-4444-555555555555/draft-1/models/abcd.stl".into();
        assert!(validate_create_listing(&req, USER).is_err());
    }

    #[test]
    fn short_paths_fail_ownership() {
        assert!(!check_user_owns_file(USER, "models/abcd.stl"));
        assert!(!check_user_owns_file(USER, &format!("2025/01/01/{}", USER)));
        assert!(check_user_owns_file(USER, &owned_path("models", "a.stl")));
    }

    #[test]
    fn both_kinds_are_required() {
        let mut req = valid_request();
        req.files.remove(1);
        assert!(validate_create_listing(&req, USER).is_err());

        let mut req = valid_request();
        req.files.remove(0);
        assert!(validate_create_listing(&req, USER).is_err());

        let mut req = valid_request();
        req.files.clear();
        assert!(validate_create_listing(&req, USER).is_err());
    }

    #[test]
    fn nozzle_temp_sanity_range() {
        let mut req = valid_request();
        req.printer_settings.recommended_nozzle_temp_c = Some(120.0);
        assert!(validate_create_listing(&req, USER).is_err());
        req.printer_settings.recommended_nozzle_temp_c = Some(500.0);
        assert!(validate_create_listing(&req, USER).is_err());
        req.printer_settings.recommended_nozzle_temp_c = Some(210.0);
        assert!(validate_create_listing(&req, USER).is_ok());
    }

    #[test]
    fn empty_material_entries_are_rejected() {
        let mut req = valid_request();
        req.printer_settings.recommended_materials = Some(vec!["PLA".into(), "  ".into()]);
        assert!(validate_create_listing(&req, USER).is_err());
    }

    #[test]
    fn public_url_joins_with_exactly_one_slash() {
        assert_eq!(
            public_file_url("http://cdn/public-files/", "/a/b.png"),
            "http://cdn/public-files/a/b.png"
        );
        assert_eq!(
            public_file_url("http://cdn/public-files", "a/b.png"),
            "http://cdn/public-files/a/b.png"
        );
    }

    fn sample_listing() -> Listing {
        Listing {
            id: Uuid::new_v4(),
            seller_id: Uuid::parse_str(USER).unwrap(),
            seller_name: "test@example.com".into(),
            seller_username: "tester".into(),
            seller_verified: false,
            title: "Valid Listing".into(),
            description: "A listing used for patch tests".into(),
            price_min_unit: 1050,
            currency: "gbp".into(),
            categories: vec!["art".into()],
            license: "standard".into(),
            client_id: "web".into(),
            trace_id: "t".into(),
            thumbnail_path: Some("2025/01/01/u/d/images/t.png".into()),
            status: ListingStatus::PendingValidation,
            is_remixing_allowed: true,
            parent_listing_id: None,
            is_physical: true,
            total_weight_grams: None,
            is_assembly_required: false,
            is_hardware_required: false,
            hardware_required: vec![],
            is_multicolor: false,
            dimensions_mm: None,
            recommended_nozzle_temp_c: None,
            recommended_materials: vec![],
            is_ai_generated: false,
            ai_model_name: None,
            is_nsfw: false,
            likes_count: 0,
            downloads_count: 0,
            comments_count: 0,
            is_sale_active: false,
            sale_name: None,
            sale_price: None,
            sale_end_timestamp: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_indexed_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn noop_patch_changes_nothing() {
        let listing = sample_listing();
        let patched = apply_update(listing.clone(), &UpdateListingRequest::default()).unwrap();
        assert_eq!(patched.title, listing.title);
        assert_eq!(patched.price_min_unit, listing.price_min_unit);
        assert_eq!(patched.ai_model_name, listing.ai_model_name);
    }

    #[test]
    fn patch_updates_only_present_fields() {
        let patch = UpdateListingRequest {
            title: Some("A Better Dragon".into()),
            price_min_unit: Some(2000),
            ..Default::default()
        };
        let patched = apply_update(sample_listing(), &patch).unwrap();
        assert_eq!(patched.title, "A Better Dragon");
        assert_eq!(patched.price_min_unit, 2000);
        assert_eq!(patched.description, "A listing used for patch tests");
    }

    #[test]
    fn patch_rejects_negative_price() {
        let patch = UpdateListingRequest {
            price_min_unit: Some(-5),
            ..Default::default()
        };
        assert!(apply_update(sample_listing(), &patch).is_err());
    }

    #[test]
    fn patch_enforces_ai_disclosure() {
        let patch = UpdateListingRequest {
            is_ai_generated: Some(true),
            ..Default::default()
        };
        assert!(apply_update(sample_listing(), &patch).is_err());

        let patch = UpdateListingRequest {
            is_ai_generated: Some(true),
            ai_model_name: Some("TripoSR".into()),
            ..Default::default()
        };
        let patched = apply_update(sample_listing(), &patch).unwrap();
        assert_eq!(patched.ai_model_name.as_deref(), Some("TripoSR"));
    }

    #[test]
    fn empty_ai_name_clears_disclosure() {
        let mut listing = sample_listing();
        listing.ai_model_name = Some("TripoSR".into());
        let patch = UpdateListingRequest {
            ai_model_name: Some("".into()),
            ..Default::default()
        };
        let patched = apply_update(listing, &patch).unwrap();
        assert!(patched.ai_model_name.is_none());
    }

    #[test]
    fn patch_maps_dimensions_to_storage_shape() {
        let patch = UpdateListingRequest {
            dimensions: Some(crate::models::Dimensions {
                x: 10.0,
                y: 20.0,
                z: 30.0,
            }),
            ..Default::default()
        };
        let patched = apply_update(sample_listing(), &patch).unwrap();
        let stored = patched.dimensions_mm.unwrap();
        assert_eq!(stored["width"], 10.0);
        assert_eq!(stored["depth"], 20.0);
        assert_eq!(stored["height"], 30.0);
    }

    /// Storage double returning deterministic signed URLs.
    struct FakeStorage;

    #[async_trait]
    impl ObjectStorage for FakeStorage {
        async fn generate_upload_url(&self, _cfg: UploadGrantConfig) -> Result<UploadGrant> {
            unimplemented!("not used by read assembly")
        }

        async fn presign_get(
            &self,
            bucket: Bucket,
            key: &str,
            _expiry: Duration,
        ) -> Result<String> {
            Ok(format!("https://signed.example.com/{}/{}?sig=abc", bucket, key))
        }

        async fn copy(&self, _: Bucket, _: &str, _: Bucket, _: &str) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _: Bucket, _: &str) -> Result<()> {
            Ok(())
        }

        async fn get(&self, _: Bucket, _: &str) -> Result<ObjectStream> {
            unimplemented!("not used by read assembly")
        }
    }

    fn file(kind: FileKind, status: FileStatus, path: &str) -> ListingFile {
        ListingFile {
            id: Uuid::new_v4(),
            listing_id: Uuid::new_v4(),
            file_path: path.into(),
            file_type: kind,
            file_size: 100,
            metadata: None,
            status,
            error_message: None,
            is_generated: false,
            source_file_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn assembly_applies_per_kind_url_policy() {
        let files = vec![
            file(FileKind::Model, FileStatus::Valid, "m/model.stl"),
            file(FileKind::Image, FileStatus::Valid, "i/shot.png"),
            file(FileKind::Image, FileStatus::Pending, "i/pending.png"),
            file(FileKind::Model, FileStatus::Invalid, "m/bad.stl"),
        ];

        let response = assemble_response(
            sample_listing(),
            files,
            &FakeStorage,
            "http://cdn/public-files",
        )
        .await;

        assert_eq!(response.files.len(), 4);
        let model = &response.files[0];
        assert!(model
            .file_path
            .as_deref()
            .unwrap()
            .starts_with("https://signed.example.com/product-files/m/model.stl"));

        let image = &response.files[1];
        assert_eq!(
            image.file_path.as_deref(),
            Some("http://cdn/public-files/i/shot.png")
        );

        // Anything not VALID exposes no path at all.
        assert!(response.files[2].file_path.is_none());
        assert!(response.files[3].file_path.is_none());

        assert_eq!(
            response.thumbnail_path.as_deref(),
            Some("http://cdn/public-files/2025/01/01/u/d/images/t.png")
        );
        assert_eq!(response.status, "PENDING_VALIDATION");
    }

    #[tokio::test]
    async fn assembly_flattens_dimensions() {
        let mut listing = sample_listing();
        listing.dimensions_mm = Some(serde_json::json!({
            "width": 100.0, "depth": 50.0, "height": 25.0
        }));

        let response = assemble_response(listing, vec![], &FakeStorage, "http://cdn").await;
        assert_eq!(response.dim_x_mm, Some(100.0));
        assert_eq!(response.dim_y_mm, Some(50.0));
        assert_eq!(response.dim_z_mm, Some(25.0));
    }
}
