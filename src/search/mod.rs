//! Search index abstraction and the denormalized listing document.

pub mod memory;
pub mod typesense;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Collection holding one document per listing.
pub const LISTINGS_COLLECTION: &str = "listings";

/// Search index abstraction. Upserts are idempotent by document id.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create the collection if missing, otherwise sync any new schema
    /// fields. Existing field types are never changed.
    async fn ensure_collection(&self) -> Result<()>;

    /// Insert or replace a document by its `id` field.
    async fn upsert(&self, collection: &str, document: &serde_json::Value) -> Result<()>;

    /// Remove a document.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Verify the engine is reachable and healthy.
    async fn health_check(&self) -> Result<()>;
}

/// Denormalized listing document as stored in the search index.
///
/// Optional numerics serialize as present-or-absent fields; timestamps are
/// seconds since epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingDocument {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail_url: String,
    pub categories: Vec<String>,
    pub license: String,

    pub is_physical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dim_x_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dim_y_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dim_z_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_weight_grams: Option<i64>,

    pub is_assembly_required: bool,
    pub is_hardware_required: bool,
    pub hardware_required: Vec<String>,
    pub recommended_materials: Vec<String>,
    pub is_multicolor: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_nozzle_temp_c: Option<i64>,

    pub is_nsfw: bool,
    pub is_ai_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_model_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_listing_id: Option<String>,
    pub is_remix_allowed: bool,

    pub likes_count: i64,
    pub downloads_count: i64,
    pub comments_count: i64,

    pub price_min_unit: i64,
    pub currency: String,
    pub is_sale_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_end_timestamp: Option<i64>,

    pub seller_id: String,
    pub seller_name: String,
    pub seller_username: String,
    pub seller_verified: bool,

    pub created_at: i64,
    pub updated_at: i64,
}

/// Typesense schema for the listings collection.
///
/// `created_at` is the default sorting field. The embedding vector is
/// optional: documents index fine without it and the vector is backfilled by
/// a separate pipeline.
pub fn listings_schema() -> serde_json::Value {
    serde_json::json!({
        "name": LISTINGS_COLLECTION,
        "fields": [
            {"name": "id", "type": "string"},
            {"name": "title", "type": "string"},
            {"name": "description", "type": "string"},
            {"name": "thumbnail_url", "type": "string"},
            {"name": "categories", "type": "string[]", "facet": true},
            {"name": "license", "type": "string"},
            {"name": "embedding", "type": "float[]", "num_dim": 768, "optional": true},
            {"name": "is_physical", "type": "bool"},
            {"name": "dim_x_mm", "type": "float", "optional": true, "sort": true},
            {"name": "dim_y_mm", "type": "float", "optional": true, "sort": true},
            {"name": "dim_z_mm", "type": "float", "optional": true, "sort": true},
            {"name": "total_weight_grams", "type": "int64", "optional": true},
            {"name": "is_assembly_required", "type": "bool"},
            {"name": "is_hardware_required", "type": "bool"},
            {"name": "hardware_required", "type": "string[]"},
            {"name": "is_multicolor", "type": "bool"},
            {"name": "recommended_materials", "type": "string[]", "facet": true},
            {"name": "recommended_nozzle_temp_c", "type": "int64", "optional": true, "sort": true},
            {"name": "is_nsfw", "type": "bool", "facet": true},
            {"name": "is_ai_generated", "type": "bool", "facet": true},
            {"name": "ai_model_name", "type": "string", "optional": true},
            {"name": "parent_listing_id", "type": "string", "optional": true},
            {"name": "is_remix_allowed", "type": "bool"},
            {"name": "likes_count", "type": "int64", "sort": true},
            {"name": "downloads_count", "type": "int64", "sort": true},
            {"name": "comments_count", "type": "int64", "sort": true},
            {"name": "price_min_unit", "type": "int64", "facet": true, "sort": true},
            {"name": "currency", "type": "string"},
            {"name": "is_sale_active", "type": "bool"},
            {"name": "sale_name", "type": "string", "optional": true},
            {"name": "sale_price", "type": "int64", "optional": true},
            {"name": "sale_end_timestamp", "type": "int64", "optional": true},
            {"name": "seller_id", "type": "string"},
            {"name": "seller_name", "type": "string"},
            {"name": "seller_username", "type": "string"},
            {"name": "seller_verified", "type": "bool"},
            {"name": "created_at", "type": "int64", "sort": true},
            {"name": "updated_at", "type": "int64", "sort": true}
        ],
        "default_sorting_field": "created_at"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_optionals_are_omitted_from_documents() {
        let doc = ListingDocument {
            id: "x".into(),
            title: "t".into(),
            description: "d".into(),
            thumbnail_url: "u".into(),
            categories: vec![],
            license: "standard".into(),
            is_physical: true,
            dim_x_mm: None,
            dim_y_mm: None,
            dim_z_mm: None,
            total_weight_grams: None,
            is_assembly_required: false,
            is_hardware_required: false,
            hardware_required: vec![],
            recommended_materials: vec![],
            is_multicolor: false,
            recommended_nozzle_temp_c: None,
            is_nsfw: false,
            is_ai_generated: false,
            ai_model_name: None,
            parent_listing_id: None,
            is_remix_allowed: true,
            likes_count: 0,
            downloads_count: 0,
            comments_count: 0,
            price_min_unit: 0,
            currency: "gbp".into(),
            is_sale_active: false,
            sale_name: None,
            sale_price: None,
            sale_end_timestamp: None,
            seller_id: "s".into(),
            seller_name: "n".into(),
            seller_username: "un".into(),
            seller_verified: false,
            created_at: 1,
            updated_at: 2,
        };

        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains("dim_x_mm"));
        assert!(!json.contains("ai_model_name"));
        assert!(!json.contains("sale_end_timestamp"));
        assert!(json.contains("\"created_at\":1"));
    }

    #[test]
    fn schema_defaults_sort_to_created_at() {
        let schema = listings_schema();
        assert_eq!(schema["default_sorting_field"], "created_at");
        assert_eq!(schema["name"], LISTINGS_COLLECTION);
        let fields = schema["fields"].as_array().unwrap();
        assert!(fields.iter().any(|f| f["name"] == "embedding"
            && f["num_dim"] == 768
            && f["optional"] == true));
    }
}
