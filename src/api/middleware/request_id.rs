//! Per-request correlation ids.
//!
//! Every request gets a UUID that travels three ways: into handler scope via
//! a task local (so error envelopes can report it without threading it
//! through every signature), into the response as `X-Request-Id`, and into
//! created listings as their trace correlator.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Request extension carrying the id for anything that prefers extensions
/// over the task local.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// The current request's id, when called from within a request task.
pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|id| id.clone()).ok()
}

/// Assign an id and run the rest of the stack inside its scope.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = Uuid::new_v4().to_string();
    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = REQUEST_ID.scope(id.clone(), next.run(request)).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(X_REQUEST_ID.clone(), value);
    }
    response
}
