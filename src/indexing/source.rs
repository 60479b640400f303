//! Read side of the indexing worker.
//!
//! The worker only needs two database operations, so they sit behind a small
//! trait with a Postgres implementation and an in-memory one for tests.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::Listing;

/// Listing reads and the indexed-at write used by the worker.
#[async_trait]
pub trait ListingIndexSource: Send + Sync {
    /// Fetch a listing for indexing. Soft-deleted listings are invisible.
    async fn listing_by_id(&self, id: Uuid) -> Result<Option<Listing>>;

    /// Record that the listing's current state has been indexed.
    /// Last-writer-wins by design.
    async fn mark_indexed(&self, id: Uuid) -> Result<()>;
}

/// Postgres-backed source.
pub struct PgListingSource {
    db: PgPool,
}

impl PgListingSource {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ListingIndexSource for PgListingSource {
    async fn listing_by_id(&self, id: Uuid) -> Result<Option<Listing>> {
        let listing = sqlx::query_as::<_, Listing>(
            "SELECT * FROM listings WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(listing)
    }

    async fn mark_indexed(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE listings SET last_indexed_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

/// In-memory source for worker tests.
#[cfg(test)]
pub mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::error::AppError;

    #[derive(Default)]
    pub struct InMemoryListingSource {
        listings: Mutex<HashMap<Uuid, Listing>>,
        indexed: Mutex<Vec<Uuid>>,
        failing: Mutex<bool>,
    }

    impl InMemoryListingSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, listing: Listing) {
            self.listings.lock().unwrap().insert(listing.id, listing);
        }

        /// Simulate database unavailability.
        pub fn set_failing(&self, failing: bool) {
            *self.failing.lock().unwrap() = failing;
        }

        /// Ids whose `last_indexed_at` was written, in order.
        pub fn indexed(&self) -> Vec<Uuid> {
            self.indexed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ListingIndexSource for InMemoryListingSource {
        async fn listing_by_id(&self, id: Uuid) -> Result<Option<Listing>> {
            if *self.failing.lock().unwrap() {
                return Err(AppError::Database("simulated outage".into()));
            }
            Ok(self.listings.lock().unwrap().get(&id).cloned())
        }

        async fn mark_indexed(&self, id: Uuid) -> Result<()> {
            if *self.failing.lock().unwrap() {
                return Err(AppError::Database("simulated outage".into()));
            }
            self.indexed.lock().unwrap().push(id);
            Ok(())
        }
    }
}
