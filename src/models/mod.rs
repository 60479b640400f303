//! Database entity models.

pub mod listing;
pub mod listing_file;

pub use listing::{Dimensions, Listing, ListingStatus, StoredDimensions};
pub use listing_file::{FileKind, FileStatus, ListingFile};
