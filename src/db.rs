//! Database connection pools.
//!
//! The two processes have very different connection shapes, so each gets its
//! own pool profile instead of one shared tuning:
//!
//! - The gateway multiplexes many short-lived requests; create/delete hold a
//!   transaction briefly and reads are single statements. Its pool is sized
//!   to the request concurrency the 60 s deadline realistically admits.
//! - The worker never runs more than the bus's unacked-delivery cap of
//!   handlers at once, each doing one listing read and one indexed-at write,
//!   plus the health probe. A handful of connections is already generous.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::Result;
use crate::events::MAX_IN_FLIGHT;

/// Pool for the API gateway process.
pub async fn gateway_pool(db_dsn: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(16)
        .min_connections(4)
        // Give up well inside the request deadline so the caller gets a
        // clean error instead of a timeout.
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .connect(db_dsn)
        .await?;

    Ok(pool)
}

/// Pool for the indexing worker process.
pub async fn worker_pool(db_dsn: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        // One connection per in-flight message, one spare for /healthz.
        .max_connections(MAX_IN_FLIGHT as u32 + 1)
        .min_connections(1)
        // An acquire that cannot be served quickly should fail and nack the
        // message long before the 30 s handler deadline expires.
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .connect(db_dsn)
        .await?;

    Ok(pool)
}
