//! Request and response types for the HTTP API.
//!
//! Field names follow the frontend contract: camelCase flags on requests,
//! snake_case on responses. Every optional is a real `Option` so "absent"
//! never collapses into a zero value.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Dimensions, FileKind, FileStatus};

/// One file attached to a create request. The path must be a key previously
/// authorized through `/files/presign`.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct CreateListingFile {
    /// "model" or "image"
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    /// Size in bytes
    pub size: i64,
}

/// Slicer and tech-spec fields on a create request.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct PrinterSettings {
    #[serde(rename = "nozzleDiameter")]
    pub nozzle_diameter: Option<String>,
    #[serde(rename = "nozzleTemperature")]
    pub nozzle_temperature: Option<f64>,
    #[serde(rename = "recommendedMaterials")]
    pub recommended_materials: Option<Vec<String>>,
    #[serde(rename = "recommendedNozzleTempC")]
    pub recommended_nozzle_temp_c: Option<f64>,
    #[serde(rename = "isAssemblyRequired", default)]
    pub is_assembly_required: bool,
    #[serde(rename = "isHardwareRequired", default)]
    pub is_hardware_required: bool,
    #[serde(rename = "isMulticolor", default)]
    pub is_multicolor: bool,
    #[serde(rename = "hardwareRequired")]
    pub hardware_required: Option<Vec<String>>,
}

/// Body of `POST /listings`.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct CreateListingRequest {
    pub title: String,
    pub description: String,
    pub categories: Vec<String>,
    pub license: String,

    /// Price in minor currency units
    #[serde(default)]
    pub price_min_unit: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(rename = "isFree", default)]
    pub is_free: bool,

    #[serde(rename = "printerSettings", default)]
    pub printer_settings: PrinterSettings,
    pub dimensions: Option<Dimensions>,

    #[serde(rename = "isNSFW", default)]
    pub is_nsfw: bool,
    #[serde(rename = "isPhysical", default)]
    pub is_physical: bool,

    #[serde(rename = "isAIGenerated", default)]
    pub is_ai_generated: bool,
    #[serde(rename = "aiModelName")]
    pub ai_model_name: Option<String>,

    #[serde(rename = "isRemixingAllowed", default)]
    pub is_remixing_allowed: bool,

    pub files: Vec<CreateListingFile>,
}

/// Printer-settings patch. Absent fields are unchanged.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct UpdatePrinterSettings {
    #[serde(rename = "nozzleDiameter")]
    pub nozzle_diameter: Option<String>,
    #[serde(rename = "nozzleTemperature")]
    pub nozzle_temperature: Option<f64>,
    #[serde(rename = "recommendedMaterials")]
    pub recommended_materials: Option<Vec<String>>,
    #[serde(rename = "recommendedNozzleTempC")]
    pub recommended_nozzle_temp_c: Option<f64>,
    #[serde(rename = "isAssemblyRequired")]
    pub is_assembly_required: Option<bool>,
    #[serde(rename = "isHardwareRequired")]
    pub is_hardware_required: Option<bool>,
    #[serde(rename = "isMulticolor")]
    pub is_multicolor: Option<bool>,
    #[serde(rename = "hardwareRequired")]
    pub hardware_required: Option<Vec<String>>,
}

/// Body of `PUT /listings/{id}`. Every field is optional; absence means
/// unchanged.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct UpdateListingRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub categories: Option<Vec<String>>,
    pub license: Option<String>,

    pub price_min_unit: Option<i64>,
    pub currency: Option<String>,
    #[serde(rename = "isFree")]
    pub is_free: Option<bool>,

    #[serde(rename = "printerSettings")]
    pub printer_settings: Option<UpdatePrinterSettings>,
    pub dimensions: Option<Dimensions>,

    #[serde(rename = "isNSFW")]
    pub is_nsfw: Option<bool>,
    #[serde(rename = "isPhysical")]
    pub is_physical: Option<bool>,

    #[serde(rename = "isAIGenerated")]
    pub is_ai_generated: Option<bool>,
    #[serde(rename = "aiModelName")]
    pub ai_model_name: Option<String>,

    #[serde(rename = "isRemixingAllowed")]
    pub is_remixing_allowed: Option<bool>,
}

/// File entry in a listing response. `file_path` is present only for
/// validated files: a signed URL for models, a public URL for images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ListingFileDto {
    pub id: String,
    pub file_path: Option<String>,
    pub file_type: FileKind,
    pub status: FileStatus,
    pub size: i64,
    pub metadata: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub is_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file_id: Option<String>,
}

/// Full listing as returned by the read paths. This exact shape is cached,
/// so it derives `Deserialize` too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ListingResponse {
    pub id: String,

    pub seller_id: String,
    pub seller_name: String,
    pub seller_username: String,
    pub seller_verified: bool,

    pub title: String,
    pub description: String,
    pub price_min_unit: i64,
    pub currency: String,
    pub categories: Vec<String>,
    pub license: String,

    pub thumbnail_path: Option<String>,
    pub files: Vec<ListingFileDto>,

    pub is_remixing_allowed: bool,
    pub parent_listing_id: Option<String>,

    pub is_physical: bool,
    pub total_weight_grams: Option<i32>,

    pub dim_x_mm: Option<f64>,
    pub dim_y_mm: Option<f64>,
    pub dim_z_mm: Option<f64>,

    pub is_assembly_required: bool,
    pub is_hardware_required: bool,
    pub hardware_required: Vec<String>,

    pub is_multicolor: bool,
    pub recommended_materials: Vec<String>,
    pub recommended_nozzle_temp_c: Option<i32>,

    pub is_ai_generated: bool,
    pub ai_model_name: Option<String>,

    pub is_nsfw: bool,

    pub likes_count: i32,
    pub downloads_count: i32,
    pub comments_count: i32,

    pub is_sale_active: bool,
    pub sale_name: Option<String>,
    pub sale_end_timestamp: Option<DateTime<Utc>>,

    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_indexed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Body of `POST /files/presign`.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct PresignRequest {
    /// "model" or "image"
    #[serde(rename = "type")]
    pub kind: String,
    pub filename: String,
    #[serde(default)]
    pub content_type: String,
    pub draft_id: String,
}

/// Upload grant returned by `/files/presign`. The form fields must be posted
/// verbatim with the file as the last field.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PresignResponse {
    #[serde(rename = "uploadUrl")]
    pub upload_url: String,
    pub fields: HashMap<String, String>,
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_parses_frontend_shape() {
        let body = serde_json::json!({
            "title": "Articulated Dragon",
            "description": "A print-in-place dragon with 20+ joints",
            "categories": ["artistic"],
            "license": "standard",
            "price_min_unit": 0,
            "currency": "gbp",
            "isFree": true,
            "files": [
                {"type": "model", "path": "2025/01/01/u/d/models/a.stl", "size": 1024},
                {"type": "image", "path": "2025/01/01/u/d/images/b.png", "size": 500}
            ]
        });

        let req: CreateListingRequest = serde_json::from_value(body).unwrap();
        assert!(req.is_free);
        assert_eq!(req.files.len(), 2);
        assert_eq!(req.files[0].kind, "model");
        // Unspecified nested settings default cleanly
        assert!(!req.printer_settings.is_assembly_required);
        assert!(req.dimensions.is_none());
    }

    #[test]
    fn update_request_distinguishes_absent_from_empty() {
        let req: UpdateListingRequest = serde_json::from_str(r#"{"title": ""}"#).unwrap();
        assert_eq!(req.title.as_deref(), Some(""));
        assert!(req.description.is_none());
    }

    #[test]
    fn absent_source_file_is_omitted() {
        let dto = ListingFileDto {
            id: "f1".into(),
            file_path: None,
            file_type: FileKind::Model,
            status: FileStatus::Pending,
            size: 10,
            metadata: None,
            error_message: None,
            is_generated: false,
            source_file_id: None,
        };
        let json = serde_json::to_string(&dto).unwrap();
        assert!(!json.contains("source_file_id"));
        assert!(json.contains(r#""file_type":"MODEL""#));
    }
}
