//! Typesense search index client.
//!
//! A thin REST client; Typesense's surface for this service is four calls:
//! collection retrieve/create/update, document upsert, document delete and
//! health.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::error::{AppError, Result};
use crate::search::{listings_schema, SearchIndex};

const API_KEY_HEADER: &str = "X-TYPESENSE-API-KEY";

/// REST client for a Typesense cluster.
pub struct TypesenseIndex {
    base_url: String,
    api_key: String,
    http: Client,
}

impl TypesenseIndex {
    pub fn new(url: &str, api_key: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Read the response body for error context, truncated for logs.
    async fn error_body(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        format!("status {}: {}", status, snippet)
    }
}

#[async_trait]
impl SearchIndex for TypesenseIndex {
    async fn ensure_collection(&self) -> Result<()> {
        let schema = listings_schema();
        let name = schema["name"].as_str().unwrap_or_default();

        let existing = self
            .http
            .get(self.url(&format!("/collections/{}", name)))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Search(format!("Collection lookup failed: {}", e)))?;

        if existing.status() == StatusCode::NOT_FOUND {
            tracing::info!(collection = %name, "Creating search collection");
            let response = self
                .http
                .post(self.url("/collections"))
                .header(API_KEY_HEADER, &self.api_key)
                .json(&schema)
                .send()
                .await
                .map_err(|e| AppError::Search(format!("Collection create failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(AppError::Search(format!(
                    "Collection create failed: {}",
                    Self::error_body(response).await
                )));
            }
        } else if existing.status().is_success() {
            // Schema sync adds new fields; Typesense refuses type changes on
            // existing fields, which is the safe behavior.
            tracing::info!(collection = %name, "Syncing search collection schema");
            let update = serde_json::json!({ "fields": schema["fields"] });
            let response = self
                .http
                .patch(self.url(&format!("/collections/{}", name)))
                .header(API_KEY_HEADER, &self.api_key)
                .json(&update)
                .send()
                .await
                .map_err(|e| AppError::Search(format!("Schema update failed: {}", e)))?;

            // Typesense rejects updates containing only existing fields; that
            // is a no-op for us, not a failure.
            if !response.status().is_success() && response.status() != StatusCode::BAD_REQUEST {
                return Err(AppError::Search(format!(
                    "Schema update failed: {}",
                    Self::error_body(response).await
                )));
            }
        } else {
            return Err(AppError::Search(format!(
                "Collection lookup failed: {}",
                Self::error_body(existing).await
            )));
        }

        Ok(())
    }

    async fn upsert(&self, collection: &str, document: &serde_json::Value) -> Result<()> {
        let response = self
            .http
            .post(self.url(&format!("/collections/{}/documents", collection)))
            .query(&[("action", "upsert")])
            .header(API_KEY_HEADER, &self.api_key)
            .json(document)
            .send()
            .await
            .map_err(|e| AppError::Search(format!("Upsert failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Search(format!(
                "Upsert failed: {}",
                Self::error_body(response).await
            )));
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("/collections/{}/documents/{}", collection, id)))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Search(format!("Delete failed: {}", e)))?;

        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(AppError::Search(format!(
                "Delete failed: {}",
                Self::error_body(response).await
            )));
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .http
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| AppError::Search(format!("Health check failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Search(format!(
                "Search engine unhealthy: {}",
                response.status()
            )));
        }
        Ok(())
    }
}
