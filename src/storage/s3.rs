//! S3-compatible object storage backend using the rust-s3 crate.
//!
//! Works against MinIO in development and AWS S3 in production. Buckets are
//! addressed path-style because MinIO serves everything from one host.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use s3::bucket::Bucket as S3Bucket;
use s3::creds::Credentials;
use s3::post_policy::{PostPolicy, PostPolicyField, PostPolicyValue};
use s3::region::Region;

use crate::config::StorageConfig;
use crate::error::{AppError, Result};
use crate::storage::{
    Bucket, ObjectStorage, ObjectStream, UploadGrant, UploadGrantConfig, MIN_UPLOAD_BYTES,
};

/// S3-compatible storage provider.
pub struct S3Storage {
    region: Region,
    credentials: Credentials,
}

impl S3Storage {
    /// Create a provider from the gateway storage configuration.
    pub fn new(cfg: &StorageConfig) -> Result<Self> {
        let scheme = if cfg.use_ssl { "https" } else { "http" };
        let region = Region::Custom {
            region: "us-east-1".to_string(),
            endpoint: format!("{}://{}", scheme, cfg.endpoint.trim_end_matches('/')),
        };

        let credentials = Credentials::new(
            Some(&cfg.access_key),
            Some(&cfg.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| AppError::Config(format!("Invalid S3 credentials: {}", e)))?;

        Ok(Self {
            region,
            credentials,
        })
    }

    /// Build a bucket handle. Path style is required for MinIO.
    fn bucket(&self, bucket: Bucket) -> Result<Box<S3Bucket>> {
        let handle = S3Bucket::new(
            bucket.as_str(),
            self.region.clone(),
            self.credentials.clone(),
        )
        .map_err(|e| AppError::Storage(format!("Failed to open bucket '{}': {}", bucket, e)))?;
        Ok(handle.with_path_style())
    }
}

/// Translate provider errors into domain errors.
///
/// rust-s3 surfaces HTTP failures as stringly-typed errors, so the mapping
/// inspects the message for the status markers the providers actually emit.
fn map_s3_error(key: &str, err: s3::error::S3Error) -> AppError {
    let text = err.to_string();
    if text.contains("404") || text.contains("NoSuchKey") || text.contains("Not Found") {
        AppError::NotFound(format!("Storage key not found: {}", key))
    } else if text.contains("403") || text.contains("AccessDenied") || text.contains("Forbidden") {
        AppError::StorageAccessDenied(format!("Access denied for key: {}", key))
    } else {
        AppError::Storage(format!("Storage provider error for '{}': {}", key, text))
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn generate_upload_url(&self, cfg: UploadGrantConfig) -> Result<UploadGrant> {
        let bucket = self.bucket(cfg.bucket)?;

        // Pin every policy dimension: exact key, exact content type, and a
        // size window from MIN_UPLOAD_BYTES to the kind's limit.
        let policy = PostPolicy::new(cfg.expiry.as_secs() as u32)
            .condition(
                PostPolicyField::Key,
                PostPolicyValue::Exact(Cow::from(cfg.key.clone())),
            )
            .map_err(|e| AppError::Storage(format!("Failed to set policy key: {}", e)))?
            .condition(
                PostPolicyField::ContentType,
                PostPolicyValue::Exact(Cow::from(cfg.content_type.clone())),
            )
            .map_err(|e| AppError::Storage(format!("Failed to set policy content type: {}", e)))?
            .condition(
                PostPolicyField::ContentLengthRange,
                PostPolicyValue::Range(MIN_UPLOAD_BYTES as u32, cfg.max_bytes as u32),
            )
            .map_err(|e| AppError::Storage(format!("Failed to set policy size range: {}", e)))?;

        let presigned = bucket
            .presign_post(policy)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to generate post policy: {}", e)))?;

        tracing::debug!(key = %cfg.key, bucket = %cfg.bucket, "Generated upload grant");

        Ok(UploadGrant {
            upload_url: presigned.url,
            form_fields: presigned.fields.into_iter().collect(),
        })
    }

    async fn presign_get(&self, bucket: Bucket, key: &str, expiry: Duration) -> Result<String> {
        let handle = self.bucket(bucket)?;
        let url = handle
            .presign_get(key, expiry.as_secs() as u32, None)
            .await
            .map_err(|e| map_s3_error(key, e))?;
        Ok(url)
    }

    async fn copy(
        &self,
        src_bucket: Bucket,
        src_key: &str,
        dest_bucket: Bucket,
        dest_key: &str,
    ) -> Result<()> {
        let dest = self.bucket(dest_bucket)?;

        // CopyObject wants the source as "bucket/key".
        let copy_source = format!("{}/{}", src_bucket.as_str(), src_key);
        dest.copy_object_internal(&copy_source, dest_key)
            .await
            .map_err(|e| map_s3_error(src_key, e))?;

        tracing::debug!(
            src = %src_key,
            dest = %dest_key,
            "Server-side copy successful"
        );
        Ok(())
    }

    async fn delete(&self, bucket: Bucket, key: &str) -> Result<()> {
        let handle = self.bucket(bucket)?;
        handle
            .delete_object(key)
            .await
            .map_err(|e| map_s3_error(key, e))?;
        tracing::debug!(key = %key, bucket = %bucket, "Deleted object");
        Ok(())
    }

    async fn get(&self, bucket: Bucket, key: &str) -> Result<ObjectStream> {
        let handle = self.bucket(bucket)?;
        let owned_key = key.to_string();
        let response = handle
            .get_object_stream(key)
            .await
            .map_err(|e| map_s3_error(key, e))?;

        let stream = response
            .bytes
            .map(move |chunk| chunk.map_err(|e| map_s3_error(&owned_key, e)));
        Ok(Box::pin(stream))
    }
}
