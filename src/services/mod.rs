//! Business logic services.

pub mod file_service;
pub mod listing_service;

pub use file_service::FileService;
pub use listing_service::ListingService;
