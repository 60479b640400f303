//! Listing file model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Kind of uploaded file. Models live in the private bucket, images in the
/// public one; the read path picks its URL strategy from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "file_kind", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum FileKind {
    Model,
    Image,
}

impl FileKind {
    /// Parse the lowercase wire form used by clients ("model" / "image").
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "model" => Some(Self::Model),
            "image" => Some(Self::Image),
            _ => None,
        }
    }

    /// Lowercase wire form used in event payloads.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Image => "image",
        }
    }
}

/// Validation state of a file. `Failed` is transient (the validation worker
/// can retry); `Invalid` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "file_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum FileStatus {
    Pending,
    Valid,
    Invalid,
    Failed,
}

/// Listing file entity
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct ListingFile {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub file_path: String,
    pub file_type: FileKind,
    pub file_size: i64,
    pub metadata: Option<serde_json::Value>,
    pub status: FileStatus,
    pub error_message: Option<String>,
    /// True for worker-produced files (renders, normalized images)
    pub is_generated: bool,
    /// Weak back-reference to the upload a generated file was derived from
    pub source_file_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_kind_case_insensitively() {
        assert_eq!(FileKind::parse("model"), Some(FileKind::Model));
        assert_eq!(FileKind::parse("Image"), Some(FileKind::Image));
        assert_eq!(FileKind::parse("MODEL"), Some(FileKind::Model));
        assert_eq!(FileKind::parse("video"), None);
    }

    #[test]
    fn kind_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&FileKind::Model).unwrap(),
            r#""MODEL""#
        );
        assert_eq!(
            serde_json::to_string(&FileStatus::Pending).unwrap(),
            r#""PENDING""#
        );
    }
}
