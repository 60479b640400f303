//! Application configuration loaded from environment variables.

use std::collections::HashMap;
use std::env;

use crate::error::{AppError, Result};

/// Read an environment variable and parse it, falling back to a default on
/// missing or invalid values.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Per-kind constraints applied to direct uploads.
#[derive(Debug, Clone)]
pub struct FileConstraint {
    /// Maximum accepted object size in bytes
    pub max_bytes: i64,
    /// Content types the presigned policy will accept
    pub allowed_mime_types: Vec<String>,
    /// Key segment between the draft id and the hashed filename
    pub key_prefix: String,
}

/// Event bus subject names.
#[derive(Debug, Clone)]
pub struct EventConfig {
    pub start_image_validation: String,
    pub start_model_validation: String,
    pub index_listing: String,
}

impl EventConfig {
    pub fn from_env() -> Self {
        Self {
            start_image_validation: env::var("EVENT_VALIDATE_IMAGE_START")
                .unwrap_or_else(|_| "file.image.start".into()),
            start_model_validation: env::var("EVENT_VALIDATE_MODEL_START")
                .unwrap_or_else(|_| "file.model.start".into()),
            index_listing: env::var("EVENT_INDEX_LISTING")
                .unwrap_or_else(|_| "listing.index".into()),
        }
    }
}

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub addr: String,
    pub password: String,
    pub pool_size: u32,
    pub min_idle_conns: u32,
}

/// Object store connection settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub use_ssl: bool,
}

/// OIDC issuer settings used to verify bearer tokens.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub url: String,
    pub realm: String,
    pub client_id: String,
}

impl AuthConfig {
    /// Issuer URL as it appears in the token `iss` claim.
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.url.trim_end_matches('/'), self.realm)
    }

    /// JWKS endpoint for the realm.
    pub fn jwks_url(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.issuer())
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string
    pub db_dsn: String,

    /// NATS server endpoint
    pub nats_endpoint: String,

    /// Redis cache settings
    pub cache: CacheConfig,

    /// Object store settings (MinIO or any S3-compatible service)
    pub storage: StorageConfig,

    /// OIDC issuer settings
    pub auth: AuthConfig,

    /// Base URL under which the public-files bucket is served
    pub public_files_url: String,

    /// Frontend origin allowed by CORS
    pub frontend_origin: String,

    /// Gateway listen port
    pub api_port: u16,

    /// Worker health-server listen port
    pub index_worker_port: u16,

    /// Typesense endpoint and API key
    pub typesense_url: String,
    pub typesense_api_key: String,

    /// Event bus subject names
    pub events: EventConfig,

    /// How long a presigned upload grant stays valid, in hours
    pub upload_window_hours: u64,

    /// Upload constraints keyed by file kind ("image" / "model")
    pub file_constraints: HashMap<String, FileConstraint>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            db_dsn: env::var("DB_DSN").map_err(|_| AppError::Config("DB_DSN not set".into()))?,
            nats_endpoint: env::var("NATS_ENDPOINT")
                .unwrap_or_else(|_| "nats://127.0.0.1:4222".into()),
            cache: CacheConfig {
                addr: env::var("REDIS_ADDR").unwrap_or_else(|_| "127.0.0.1:6379".into()),
                password: env::var("REDIS_PASSWORD").unwrap_or_default(),
                pool_size: env_parse("REDIS_POOL_SIZE", 100),
                min_idle_conns: env_parse("REDIS_MIN_IDLE_CONNS", 10),
            },
            storage: StorageConfig {
                endpoint: env::var("S3_ENDPOINT").unwrap_or_else(|_| "127.0.0.1:9000".into()),
                access_key: env::var("GATEWAY_S3_ACCESS_KEY_ID").unwrap_or_default(),
                secret_key: env::var("GATEWAY_S3_SECRET_ACCESS_KEY").unwrap_or_default(),
                use_ssl: matches!(env::var("S3_USE_SSL").as_deref(), Ok("true" | "1")),
            },
            auth: AuthConfig {
                url: env::var("AUTHORIZATION_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:8180".into()),
                realm: env::var("AUTHORIZATION_REALM").unwrap_or_else(|_| "printbay".into()),
                client_id: env::var("AUTHORIZATION_CLIENT_ID")
                    .unwrap_or_else(|_| "gateway".into()),
            },
            public_files_url: env::var("PUBLIC_FILES_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9000/public-files".into()),
            frontend_origin: env::var("DOMAIN_NAME")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            api_port: env_parse("API_PORT", 8080),
            index_worker_port: env_parse("INDEX_WORKER_PORT", 8081),
            typesense_url: env::var("TYPESENSE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8108".into()),
            typesense_api_key: env::var("TYPESENSE_API_KEY").unwrap_or_default(),
            events: EventConfig::from_env(),
            upload_window_hours: env_parse("UPLOAD_WINDOW_HOURS", 1),
            file_constraints: default_file_constraints(),
        })
    }
}

/// Built-in upload constraints per file kind.
///
/// Images land in the gallery and are re-encoded by the validation workers;
/// models are served as uploaded, so the accepted types are strict.
pub fn default_file_constraints() -> HashMap<String, FileConstraint> {
    HashMap::from([
        (
            "image".to_string(),
            FileConstraint {
                max_bytes: 5 * 1024 * 1024,
                allowed_mime_types: vec![
                    "image/jpeg".into(),
                    "image/png".into(),
                    "image/gif".into(),
                ],
                key_prefix: "images".into(),
            },
        ),
        (
            "model".to_string(),
            FileConstraint {
                max_bytes: 50 * 1024 * 1024,
                allowed_mime_types: vec![
                    "application/vnd.ms-pki.stl".into(),
                    "application/octet-stream".into(),
                    "application/vnd.ms-pki.3mf".into(),
                    "model/stl".into(),
                    "model/3mf".into(),
                ],
                key_prefix: "models".into(),
            },
        ),
    ])
}
