//! Listing model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle state of a listing.
///
/// Created in `PendingValidation`; the validation workers drive the move to
/// `Active` or `Rejected`. `Hidden` is an admin state. Nothing in this
/// repository performs the promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "listing_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    PendingValidation,
    Active,
    Rejected,
    Hidden,
}

/// Physical dimensions in millimetres as clients send them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Dimensions {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Shape of the `dimensions_mm` JSONB column.
///
/// Stored under width/depth/height keys; `x` maps to width, `y` to depth and
/// `z` to height on both the write and read paths.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StoredDimensions {
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub depth: f64,
    #[serde(default)]
    pub height: f64,
}

impl From<Dimensions> for StoredDimensions {
    fn from(d: Dimensions) -> Self {
        Self {
            width: d.x,
            depth: d.y,
            height: d.z,
        }
    }
}

impl From<StoredDimensions> for Dimensions {
    fn from(d: StoredDimensions) -> Self {
        Self {
            x: d.width,
            y: d.depth,
            z: d.height,
        }
    }
}

/// Listing entity
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Listing {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub seller_name: String,
    pub seller_username: String,
    pub seller_verified: bool,

    pub title: String,
    pub description: String,
    pub price_min_unit: i64,
    pub currency: String,
    pub categories: Vec<String>,
    pub license: String,

    /// Authorized party (`azp` claim) of the creating client
    pub client_id: String,
    /// Ambient trace correlator captured at creation
    pub trace_id: String,
    pub thumbnail_path: Option<String>,
    pub status: ListingStatus,

    pub is_remixing_allowed: bool,
    pub parent_listing_id: Option<Uuid>,

    pub is_physical: bool,
    pub total_weight_grams: Option<i32>,
    pub is_assembly_required: bool,
    pub is_hardware_required: bool,
    pub hardware_required: Vec<String>,
    pub is_multicolor: bool,
    pub dimensions_mm: Option<serde_json::Value>,
    pub recommended_nozzle_temp_c: Option<i32>,
    pub recommended_materials: Vec<String>,

    pub is_ai_generated: bool,
    pub ai_model_name: Option<String>,
    pub is_nsfw: bool,

    pub likes_count: i32,
    pub downloads_count: i32,
    pub comments_count: i32,

    pub is_sale_active: bool,
    pub sale_name: Option<String>,
    pub sale_price: Option<i64>,
    pub sale_end_timestamp: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Listing {
    /// Decode the `dimensions_mm` column, tolerating stale or malformed
    /// shapes by returning `None` instead of failing the caller.
    pub fn dimensions(&self) -> Option<StoredDimensions> {
        self.dimensions_mm
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}
