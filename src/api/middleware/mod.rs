//! API middleware.

pub mod auth;
pub mod idempotency;
pub mod request_id;
