//! Idempotency middleware: per-key lock-and-replay for mutating endpoints.
//!
//! The first request carrying an `Idempotency-Key` acquires an atomic lock
//! and runs; its committed response is cached and replayed verbatim to every
//! retry. A retry racing the original gets `409` with `Retry-After: 1`.
//! Server errors release the lock without persisting anything so the client
//! can retry for real.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::RETRY_AFTER, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::error::{AppError, Result};

/// How long a running request blocks its retries.
const LOCK_TTL: Duration = Duration::from_secs(10);

/// How long a committed response is replayable.
const DATA_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const IDEMPOTENCY_KEY: &str = "idempotency-key";
static X_IDEMPOTENCY_HIT: HeaderName = HeaderName::from_static("x-idempotency-hit");

/// Headers that must not be captured or replayed: CORS is negotiated per
/// request, and the transport headers are owned by the HTTP layer.
const IGNORED_HEADERS: &[&str] = &[
    "access-control-allow-origin",
    "access-control-allow-methods",
    "access-control-allow-headers",
    "access-control-allow-credentials",
    "access-control-expose-headers",
    "date",
    "content-length",
    "connection",
];

fn is_ignored_header(name: &str) -> bool {
    IGNORED_HEADERS
        .iter()
        .any(|ignored| name.eq_ignore_ascii_case(ignored))
}

/// A captured response: status, safe headers and body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl SavedResponse {
    fn capture(status: StatusCode, headers: &axum::http::HeaderMap, body: &[u8]) -> Self {
        let headers = headers
            .iter()
            .filter(|(name, _)| !is_ignored_header(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            status: status.as_u16(),
            headers,
            body: body.to_vec(),
        }
    }

    fn replay(&self) -> Response {
        let mut response = Response::builder()
            .status(StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK));

        for (name, value) in &self.headers {
            if is_ignored_header(name) {
                continue;
            }
            response = response.header(name.as_str(), value.as_str());
        }

        response = response.header(X_IDEMPOTENCY_HIT.clone(), "true");
        response
            .body(Body::from(self.body.clone()))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

/// Redis-backed lock + replay store.
pub struct IdempotencyStore {
    cache: Cache,
}

impl IdempotencyStore {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    fn lock_key(key: &str) -> String {
        format!("{}:lock", key)
    }

    fn data_key(key: &str) -> String {
        format!("{}:data", key)
    }

    /// Try to become the request that runs the handler.
    ///
    /// A committed response counts as "lock not acquired" so the caller falls
    /// through to the replay path.
    pub async fn lock(&self, key: &str) -> Result<bool> {
        if self.get_response(key).await?.is_some() {
            return Ok(false);
        }
        self.cache.set_nx(&Self::lock_key(key), "1", LOCK_TTL).await
    }

    pub async fn get_response(&self, key: &str) -> Result<Option<SavedResponse>> {
        self.cache.get_json(&Self::data_key(key)).await
    }

    /// Persist the committed response, then drop the lock so waiting retries
    /// read the data instead of conflicting.
    pub async fn save_response(&self, key: &str, response: &SavedResponse) -> Result<()> {
        self.cache
            .set_json(&Self::data_key(key), response, DATA_TTL)
            .await?;
        let _ = self.cache.del(&Self::lock_key(key)).await;
        Ok(())
    }

    /// Release everything for a key so a retry can run the handler again.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let _ = self.cache.del(&Self::lock_key(key)).await;
        let _ = self.cache.del(&Self::data_key(key)).await;
        Ok(())
    }
}

/// The middleware itself. Requests without the header pass straight through.
pub async fn idempotency_middleware(
    State(store): State<Arc<IdempotencyStore>>,
    request: Request,
    next: Next,
) -> Response {
    let key = match request
        .headers()
        .get(IDEMPOTENCY_KEY)
        .and_then(|value| value.to_str().ok())
        .filter(|key| !key.is_empty())
    {
        Some(key) => key.to_owned(),
        None => return next.run(request).await,
    };

    // Only one request per key passes this line.
    let acquired = match store.lock(&key).await {
        Ok(acquired) => acquired,
        Err(e) => {
            // Fail closed: without the lock we cannot guarantee single
            // execution.
            return AppError::Cache(format!("Idempotency service unavailable: {}", e))
                .into_response();
        }
    };

    if !acquired {
        return match store.get_response(&key).await {
            Ok(Some(saved)) => saved.replay(),
            Ok(None) => {
                // Lock held, no data yet: the original is still running.
                let mut response =
                    AppError::Conflict("Request is currently being processed".into())
                        .into_response();
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from_static("1"));
                response
            }
            Err(e) => AppError::Cache(format!("Idempotency lookup failed: {}", e)).into_response(),
        };
    }

    let response = next.run(request).await;
    let (parts, body) = response.into_parts();

    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(key = %key, error = %e, "Failed to buffer response body");
            let _ = store.delete(&key).await;
            return AppError::Internal("Failed to capture response".into()).into_response();
        }
    };

    if parts.status.as_u16() >= 500 || parts.status == StatusCode::TOO_MANY_REQUESTS {
        // Do not memorize failures; release the lock so a retry can proceed.
        tracing::warn!(key = %key, status = %parts.status, "Server error, releasing idempotency lock");
        let _ = store.delete(&key).await;
    } else {
        let saved = SavedResponse::capture(parts.status, &parts.headers, &bytes);
        let store = store.clone();
        let key = key.clone();
        // Persist on a detached task so a slow cache write never delays the
        // client response.
        tokio::spawn(async move {
            if let Err(e) = store.save_response(&key, &saved).await {
                tracing::error!(key = %key, error = %e, "Failed to save idempotency response");
            }
        });
    }

    Response::from_parts(parts, Body::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn deny_listed_headers_are_filtered() {
        assert!(is_ignored_header("Date"));
        assert!(is_ignored_header("content-length"));
        assert!(is_ignored_header("Access-Control-Allow-Origin"));
        assert!(!is_ignored_header("content-type"));
        assert!(!is_ignored_header("location"));
    }

    #[test]
    fn capture_drops_transport_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("date", HeaderValue::from_static("today"));
        headers.insert("content-length", HeaderValue::from_static("42"));

        let saved = SavedResponse::capture(StatusCode::CREATED, &headers, br#"{"id":"x"}"#);
        assert_eq!(saved.status, 201);
        assert_eq!(saved.headers.len(), 1);
        assert_eq!(saved.headers[0].0, "content-type");
        assert_eq!(saved.body, br#"{"id":"x"}"#);
    }

    #[test]
    fn replay_is_byte_identical_and_marked() {
        let saved = SavedResponse {
            status: 201,
            headers: vec![("content-type".into(), "application/json".into())],
            body: br#"{"id":"x"}"#.to_vec(),
        };

        let response = saved.replay();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get("x-idempotency-hit").unwrap(),
            "true"
        );
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn saved_response_survives_cache_serialization() {
        let saved = SavedResponse {
            status: 200,
            headers: vec![("content-type".into(), "application/json".into())],
            body: b"hello".to_vec(),
        };
        let json = serde_json::to_vec(&saved).unwrap();
        let back: SavedResponse = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, saved);
    }
}
