//! Listing search-indexing worker logic.

pub mod service;
pub mod source;

pub use service::{build_document, IndexingService};
pub use source::{ListingIndexSource, PgListingSource};
