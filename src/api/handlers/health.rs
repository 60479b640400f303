//! Health check endpoint.
//!
//! Reports reachability of the gateway's collaborators: database, cache and
//! the search engine the indexing worker writes to.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::time::Duration;
use utoipa::ToSchema;

use crate::api::SharedState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize, ToSchema)]
pub struct HealthChecks {
    pub database: CheckStatus,
    pub cache: CheckStatus,
    pub search: CheckStatus,
}

#[derive(Serialize, ToSchema)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckStatus {
    fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            message: None,
        }
    }

    fn unhealthy(message: String) -> Self {
        Self {
            status: "unhealthy".to_string(),
            message: Some(message),
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Probe an external service health endpoint.
async fn check_service_health(base_url: &str, health_path: &str, service_name: &str) -> CheckStatus {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(e) => return CheckStatus::unhealthy(format!("probe client failed: {}", e)),
    };

    let url = format!("{}{}", base_url.trim_end_matches('/'), health_path);
    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => CheckStatus::healthy(),
        Ok(response) => {
            CheckStatus::unhealthy(format!("{} returned status {}", service_name, response.status()))
        }
        Err(e) => CheckStatus::unhealthy(format!("{} unreachable: {}", service_name, e)),
    }
}

/// Liveness and dependency status.
///
/// The gateway stays "healthy" only while the database answers; cache and
/// search degradation is reported but does not flip the overall status,
/// since reads fall back to the database and indexing retries on the bus.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    )
)]
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let database = match sqlx::query("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => CheckStatus::healthy(),
        Err(e) => CheckStatus::unhealthy(format!("Database connection failed: {}", e)),
    };

    let cache = match state.cache.ping().await {
        Ok(()) => CheckStatus::healthy(),
        Err(e) => CheckStatus::unhealthy(format!("Cache ping failed: {}", e)),
    };

    let search = check_service_health(&state.config.typesense_url, "/health", "Typesense").await;

    let overall = if database.is_healthy() {
        "healthy"
    } else {
        "unhealthy"
    };

    let status_code = if database.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: overall.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks: HealthChecks {
                database,
                cache,
                search,
            },
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_status_skips_absent_message() {
        let json = serde_json::to_string(&CheckStatus::healthy()).unwrap();
        assert_eq!(json, r#"{"status":"healthy"}"#);
    }

    #[test]
    fn unhealthy_check_carries_message() {
        let json =
            serde_json::to_string(&CheckStatus::unhealthy("connection refused".into())).unwrap();
        assert!(json.contains("connection refused"));
    }
}
