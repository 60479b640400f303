//! Object storage backends.

pub mod s3;

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::Result;

/// Logical storage zone. A dedicated type keeps random strings out of the
/// bucket position of storage calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket(pub &'static str);

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Private, 24h retention policy. Users upload here directly.
pub const BUCKET_INCOMING: Bucket = Bucket("incoming-files");

/// Public read. Validated images and thumbnails are hosted here.
pub const BUCKET_PUBLIC: Bucket = Bucket("public-files");

/// Private. Validated model files; read only via short-lived signed GETs.
pub const BUCKET_PRODUCT: Bucket = Bucket("product-files");

/// Minimum accepted upload size. Rejects empty-file spam at the policy level.
pub const MIN_UPLOAD_BYTES: i64 = 1024;

/// Constraints baked into a presigned POST policy. Every dimension an
/// uploader could abuse is pinned: location, size, type and lifetime.
#[derive(Debug, Clone)]
pub struct UploadGrantConfig {
    pub bucket: Bucket,
    pub key: String,
    pub content_type: String,
    pub max_bytes: i64,
    pub expiry: Duration,
}

/// A signed POST form. The form fields must be sent verbatim, with the file
/// as the last field.
#[derive(Debug, Clone)]
pub struct UploadGrant {
    pub upload_url: String,
    pub form_fields: HashMap<String, String>,
}

/// Streaming object body.
pub type ObjectStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Object store abstraction over S3-compatible services.
///
/// Implementations map provider failures onto two domain categories beyond
/// generic failure: [`crate::AppError::NotFound`] for absent keys and
/// [`crate::AppError::StorageAccessDenied`] for 403s.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Create a POST-policy upload grant for a single exact key.
    async fn generate_upload_url(&self, cfg: UploadGrantConfig) -> Result<UploadGrant>;

    /// Generate a temporary download URL for a private bucket.
    async fn presign_get(&self, bucket: Bucket, key: &str, expiry: Duration) -> Result<String>;

    /// Server-side copy (e.g. quarantine -> public) without moving bytes
    /// through this process.
    async fn copy(
        &self,
        src_bucket: Bucket,
        src_key: &str,
        dest_bucket: Bucket,
        dest_key: &str,
    ) -> Result<()>;

    /// Delete an object.
    async fn delete(&self, bucket: Bucket, key: &str) -> Result<()>;

    /// Stream an object body. Workers scan large files without holding them
    /// in memory, so this never buffers the whole object.
    async fn get(&self, bucket: Bucket, key: &str) -> Result<ObjectStream>;
}
