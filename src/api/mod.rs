//! API module - HTTP handlers and middleware.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;

use std::sync::Arc;

use sqlx::PgPool;

use crate::cache::Cache;
use crate::config::Config;
use crate::services::{FileService, ListingService};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub db: PgPool,
    pub cache: Cache,
    pub listing_service: Arc<ListingService>,
    pub file_service: Arc<FileService>,
}

pub type SharedState = Arc<AppState>;
