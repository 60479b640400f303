//! Indexing service: consumes index events, composes the denormalized
//! document and upserts it.
//!
//! At-least-once delivery forces every failure into one of two buckets:
//! inputs that can never succeed are logged and acked (returning `Ok`) so
//! they do not loop forever, and everything that might succeed on retry is
//! nacked (returning `Err`).

use std::sync::Arc;

use uuid::Uuid;

use crate::error::Result;
use crate::events::IndexListingEvent;
use crate::indexing::ListingIndexSource;
use crate::models::Listing;
use crate::search::{ListingDocument, SearchIndex, LISTINGS_COLLECTION};
use crate::services::listing_service::public_file_url;

/// Worker-side indexing service.
pub struct IndexingService {
    index: Arc<dyn SearchIndex>,
    source: Arc<dyn ListingIndexSource>,
    public_files_url: String,
}

impl IndexingService {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        source: Arc<dyn ListingIndexSource>,
        public_files_url: String,
    ) -> Self {
        Self {
            index,
            source,
            public_files_url,
        }
    }

    /// Bus-facing entry point: decode the payload and index.
    ///
    /// Malformed JSON is a poison pill. Ack it; redelivery cannot fix bytes.
    pub async fn handle_message(&self, payload: &[u8]) -> Result<()> {
        let event: IndexListingEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(error = %e, "Discarding malformed index event");
                return Ok(());
            }
        };

        self.index_listing(&event.listing_id).await
    }

    /// Index a single listing by id.
    pub async fn index_listing(&self, listing_id: &str) -> Result<()> {
        tracing::info!(listing_id = %listing_id, "Indexing listing");

        let id = match Uuid::parse_str(listing_id) {
            Ok(id) => id,
            Err(_) => {
                // This id will never become a valid UUID. Ack and discard.
                tracing::error!(listing_id = %listing_id, "Invalid UUID, discarding");
                return Ok(());
            }
        };

        let listing = match self.source.listing_by_id(id).await {
            Ok(Some(listing)) => listing,
            Ok(None) => {
                // Likely deleted between the event and now. Nothing to index.
                tracing::warn!(listing_id = %listing_id, "Listing not found, skipping index");
                return Ok(());
            }
            Err(e) => {
                tracing::error!(listing_id = %listing_id, error = %e, "Failed to fetch listing");
                return Err(e);
            }
        };

        if listing.thumbnail_path.is_none() {
            tracing::warn!(listing_id = %listing_id, "Listing missing thumbnail, cannot index");
            return Ok(());
        }

        let document = build_document(&listing, &self.public_files_url);
        let value = serde_json::to_value(&document)?;

        if let Err(e) = self.index.upsert(LISTINGS_COLLECTION, &value).await {
            tracing::error!(listing_id = %listing_id, error = %e, "Failed to upsert listing");
            return Err(e);
        }

        tracing::info!(listing_id = %listing_id, "Successfully indexed listing");

        if let Err(e) = self.source.mark_indexed(id).await {
            tracing::error!(listing_id = %listing_id, error = %e, "Failed to mark listing indexed");
            return Err(e);
        }

        Ok(())
    }
}

/// Compose the search document for a listing.
///
/// Dimensions flatten from the stored JSON; a stale or malformed shape yields
/// absent dimension fields rather than a failure.
pub fn build_document(listing: &Listing, public_files_url: &str) -> ListingDocument {
    let dims = listing.dimensions();
    let thumbnail_url = listing
        .thumbnail_path
        .as_deref()
        .map(|path| public_file_url(public_files_url, path))
        .unwrap_or_default();

    ListingDocument {
        id: listing.id.to_string(),
        title: listing.title.clone(),
        description: listing.description.clone(),
        thumbnail_url,
        categories: listing.categories.clone(),
        license: listing.license.clone(),

        is_physical: listing.is_physical,
        dim_x_mm: dims.map(|d| d.width),
        dim_y_mm: dims.map(|d| d.depth),
        dim_z_mm: dims.map(|d| d.height),
        total_weight_grams: listing.total_weight_grams.map(i64::from),

        is_assembly_required: listing.is_assembly_required,
        is_hardware_required: listing.is_hardware_required,
        hardware_required: listing.hardware_required.clone(),
        recommended_materials: listing.recommended_materials.clone(),
        is_multicolor: listing.is_multicolor,
        recommended_nozzle_temp_c: listing.recommended_nozzle_temp_c.map(i64::from),

        is_nsfw: listing.is_nsfw,
        is_ai_generated: listing.is_ai_generated,
        ai_model_name: listing.ai_model_name.clone(),

        parent_listing_id: listing.parent_listing_id.map(|id| id.to_string()),
        is_remix_allowed: listing.is_remixing_allowed,

        likes_count: i64::from(listing.likes_count),
        downloads_count: i64::from(listing.downloads_count),
        comments_count: i64::from(listing.comments_count),

        price_min_unit: listing.price_min_unit,
        currency: listing.currency.clone(),
        is_sale_active: listing.is_sale_active,
        sale_name: listing.sale_name.clone(),
        sale_price: listing.sale_price,
        sale_end_timestamp: listing.sale_end_timestamp.map(|t| t.timestamp()),

        seller_id: listing.seller_id.to_string(),
        seller_name: listing.seller_name.clone(),
        seller_username: listing.seller_username.clone(),
        seller_verified: listing.seller_verified,

        created_at: listing.created_at.timestamp(),
        updated_at: listing.updated_at.timestamp(),
    }
}
