//! Upload authorization service.
//!
//! Issues presigned POST grants for direct-to-storage uploads. The gateway
//! never receives file bytes: the signed form pins bucket, key, size window,
//! content type and lifetime, so nothing outside those bounds can land in
//! the incoming bucket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use sha2::{Digest, Sha256};

use crate::api::dto::{PresignRequest, PresignResponse};
use crate::config::FileConstraint;
use crate::error::{AppError, Result};
use crate::storage::{ObjectStorage, UploadGrantConfig, BUCKET_INCOMING};

/// Extension to mime-type fallback used when the client omits a content type.
fn extension_mime_map() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        (".stl", "model/stl"),
        (".3mf", "model/3mf"),
        (".obj", "application/octet-stream"),
    ])
}

/// Upload authorization service.
pub struct FileService {
    storage: Arc<dyn ObjectStorage>,
    constraints: HashMap<String, FileConstraint>,
    upload_window_hours: u64,
}

impl FileService {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        constraints: HashMap<String, FileConstraint>,
        upload_window_hours: u64,
    ) -> Self {
        Self {
            storage,
            constraints,
            upload_window_hours,
        }
    }

    /// Authorize a direct upload for one file.
    pub async fn presign_upload(
        &self,
        user_id: &str,
        req: &PresignRequest,
    ) -> Result<PresignResponse> {
        let constraint = self.constraints.get(&req.kind).ok_or_else(|| {
            AppError::Validation("Unknown file type. Must be 'model' or 'image'".into())
        })?;

        let extension = file_extension(&req.filename);
        if extension.is_empty() {
            return Err(AppError::Validation(
                "Filename must have an extension".into(),
            ));
        }

        let mime_type = resolve_mime_type(&req.kind, &req.content_type, &extension);
        if !constraint.allowed_mime_types.iter().any(|m| m == &mime_type) {
            return Err(AppError::Validation(format!(
                "File type '{}' is not allowed for {} uploads",
                mime_type, req.kind
            )));
        }

        let key = generate_storage_key(
            user_id,
            &req.draft_id,
            &req.filename,
            &constraint.key_prefix,
            &extension,
            Utc::now(),
        );

        let grant = self
            .storage
            .generate_upload_url(UploadGrantConfig {
                bucket: BUCKET_INCOMING,
                key: key.clone(),
                content_type: mime_type,
                max_bytes: constraint.max_bytes,
                expiry: Duration::from_secs(self.upload_window_hours * 3600),
            })
            .await
            .map_err(|e| match e {
                err @ AppError::Validation(_) => err,
                other => {
                    tracing::error!(error = %other, "Failed to generate upload signature");
                    AppError::Internal("Failed to generate upload signature".into())
                }
            })?;

        Ok(PresignResponse {
            upload_url: grant.upload_url,
            fields: grant.form_fields,
            key,
        })
    }
}

/// Lowercased extension including the dot, or empty when absent.
fn file_extension(filename: &str) -> String {
    match filename.rfind('.') {
        Some(idx) if idx + 1 < filename.len() => filename[idx..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Pick the content type: the client's, the extension table's, or (for
/// models with an unknown extension) a generic binary type.
fn resolve_mime_type(kind: &str, content_type: &str, extension: &str) -> String {
    if !content_type.is_empty() {
        return content_type.to_string();
    }
    if let Some(mapped) = extension_mime_map().get(extension) {
        return (*mapped).to_string();
    }
    if kind == "model" && !extension.is_empty() {
        return "application/octet-stream".to_string();
    }
    String::new()
}

/// Build the storage key for an upload.
///
/// Format: `YYYY/MM/DD/{userId}/{draftId}/{kindPrefix}/{sha256(filename)}{ext}`
/// with UTC, zero-padded date segments. The create path later checks segment
/// 3 against the caller, so this layout is load-bearing.
pub fn generate_storage_key(
    user_id: &str,
    draft_id: &str,
    filename: &str,
    prefix: &str,
    extension: &str,
    now: DateTime<Utc>,
) -> String {
    let date_prefix = format!("{:04}/{:02}/{:02}", now.year(), now.month(), now.day());
    format!(
        "{}/{}/{}/{}/{}{}",
        date_prefix,
        user_id,
        draft_id,
        prefix.trim_matches('/'),
        filename_hash(filename),
        extension
    )
}

/// Hex SHA-256 of the original filename. Keeps user-controlled names out of
/// object keys while staying stable per file.
fn filename_hash(filename: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_file_constraints;
    use crate::storage::{Bucket, ObjectStream, UploadGrant};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Storage double recording the policy it was asked to sign.
    #[derive(Default)]
    struct RecordingStorage {
        grants: Mutex<Vec<UploadGrantConfig>>,
    }

    #[async_trait]
    impl ObjectStorage for RecordingStorage {
        async fn generate_upload_url(&self, cfg: UploadGrantConfig) -> Result<UploadGrant> {
            self.grants.lock().unwrap().push(cfg.clone());
            Ok(UploadGrant {
                upload_url: format!("http://storage.local/{}", cfg.bucket),
                form_fields: HashMap::from([
                    ("key".to_string(), cfg.key),
                    ("policy".to_string(), "signed-policy".to_string()),
                ]),
            })
        }

        async fn presign_get(
            &self,
            _bucket: Bucket,
            _key: &str,
            _expiry: Duration,
        ) -> Result<String> {
            unimplemented!("not used by upload authorization")
        }

        async fn copy(&self, _: Bucket, _: &str, _: Bucket, _: &str) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _: Bucket, _: &str) -> Result<()> {
            Ok(())
        }

        async fn get(&self, _: Bucket, _: &str) -> Result<ObjectStream> {
            unimplemented!("not used by upload authorization")
        }
    }

    fn service() -> (Arc<RecordingStorage>, FileService) {
        let storage = Arc::new(RecordingStorage::default());
        let service = FileService::new(storage.clone(), default_file_constraints(), 1);
        (storage, service)
    }

    fn model_request() -> PresignRequest {
        PresignRequest {
            kind: "model".into(),
            filename: "dragon.stl".into(),
            content_type: String::new(),
            draft_id: "draft-1".into(),
        }
    }

    #[tokio::test]
    async fn grants_pin_every_policy_dimension() {
        let (storage, service) = service();

        let response = service
            .presign_upload("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11", &model_request())
            .await
            .unwrap();

        let grants = storage.grants.lock().unwrap();
        assert_eq!(grants.len(), 1);
        let grant = &grants[0];
        assert_eq!(grant.bucket, BUCKET_INCOMING);
        assert_eq!(grant.content_type, "model/stl");
        assert_eq!(grant.max_bytes, 50 * 1024 * 1024);
        assert_eq!(grant.expiry, Duration::from_secs(3600));
        assert_eq!(grant.key, response.key);

        // The key carries the caller and draft for the later ownership check.
        let segments: Vec<&str> = response.key.split('/').collect();
        assert_eq!(segments[3], "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11");
        assert_eq!(segments[4], "draft-1");
        assert_eq!(segments[5], "models");

        assert_eq!(response.fields["policy"], "signed-policy");
    }

    #[tokio::test]
    async fn unknown_kind_is_rejected() {
        let (_, service) = service();
        let mut request = model_request();
        request.kind = "video".into();

        let err = service.presign_upload("u", &request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn disallowed_content_type_is_rejected() {
        let (_, service) = service();
        let request = PresignRequest {
            kind: "image".into(),
            filename: "payload.svg".into(),
            content_type: "image/svg+xml".into(),
            draft_id: "d".into(),
        };

        let err = service.presign_upload("u", &request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn extensionless_filename_is_rejected() {
        let (_, service) = service();
        let mut request = model_request();
        request.filename = "dragon".into();

        let err = service.presign_upload("u", &request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn storage_key_is_date_user_draft_scoped() {
        let now = Utc.with_ymd_and_hms(2025, 1, 5, 10, 0, 0).unwrap();
        let key = generate_storage_key("user-1", "draft-1", "dragon.stl", "models", ".stl", now);

        let segments: Vec<&str> = key.split('/').collect();
        assert_eq!(segments.len(), 7);
        assert_eq!(segments[0], "2025");
        assert_eq!(segments[1], "01");
        assert_eq!(segments[2], "05");
        assert_eq!(segments[3], "user-1");
        assert_eq!(segments[4], "draft-1");
        assert_eq!(segments[5], "models");
        assert!(segments[6].ends_with(".stl"));
        // sha256 hex is 64 chars
        assert_eq!(segments[6].len(), 64 + 4);
    }

    #[test]
    fn storage_key_is_stable_per_filename() {
        let now = Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap();
        let a = generate_storage_key("u", "d", "a.stl", "models", ".stl", now);
        let b = generate_storage_key("u", "d", "a.stl", "models", ".stl", now);
        let c = generate_storage_key("u", "d", "b.stl", "models", ".stl", now);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn extension_extraction() {
        assert_eq!(file_extension("model.STL"), ".stl");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension("noext"), "");
        assert_eq!(file_extension("trailing."), "");
    }

    #[test]
    fn mime_resolution_prefers_explicit_type() {
        assert_eq!(
            resolve_mime_type("model", "model/stl", ".stl"),
            "model/stl"
        );
        assert_eq!(resolve_mime_type("model", "", ".stl"), "model/stl");
        assert_eq!(resolve_mime_type("model", "", ".3mf"), "model/3mf");
        // Unknown extension on a model falls back to generic binary
        assert_eq!(
            resolve_mime_type("model", "", ".step"),
            "application/octet-stream"
        );
        // Unknown extension on an image does not
        assert_eq!(resolve_mime_type("image", "", ".webp"), "");
    }
}
