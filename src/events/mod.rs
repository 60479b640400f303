//! Event bus abstraction and the domain events that flow over it.
//!
//! Delivery is at-least-once: handlers must be idempotent in effect, return
//! `Ok` to ack a message and `Err` to nack it for redelivery.

pub mod memory;
pub mod nats;
pub mod publisher;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use publisher::EventPublisher;

/// Maximum unacknowledged deliveries per subscription.
pub const MAX_IN_FLIGHT: usize = 10;

/// Deadline for a single handler invocation.
pub const HANDLER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Future returned by a message handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Handler invoked once per delivery with the raw payload.
pub type MessageHandler = Arc<dyn Fn(Bytes) -> HandlerFuture + Send + Sync>;

/// Durable publish/subscribe abstraction.
///
/// The narrow handler signature (bytes in, ack/nack out) lets the durable
/// streaming backend and the in-memory test double share subscribers.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a payload. `msg_id` is a publish id the bus uses to dedupe
    /// redundant publishes of the same logical event.
    async fn publish(&self, subject: &str, payload: Bytes, msg_id: &str) -> Result<()>;

    /// Attach a handler to a subject within a queue group. Subscribers in the
    /// same group share work: one delivery per group per message, modulo
    /// retries.
    async fn subscribe(&self, subject: &str, group: &str, handler: MessageHandler) -> Result<()>;

    /// Finish in-flight handlers and stop consuming. Called on shutdown.
    async fn drain(&self) -> Result<()>;
}

/// Emitted once per uploaded file after the listing transaction commits.
/// Routed by file kind to the image- or model-validation subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartFileValidationEvent {
    /// Listing the file belongs to
    pub listing_id: String,
    /// Uploading user
    pub user_id: String,
    /// Cross-service trace correlator
    pub trace_id: String,
    /// File row id
    pub file_id: String,
    /// Object location in storage
    pub file_key: String,
    /// "image" | "model"
    pub file_type: String,
}

impl StartFileValidationEvent {
    /// Stable publish id so bursts of the same event dedupe on the bus.
    pub fn publish_id(&self) -> String {
        format!("start.{}.{}.{}", self.user_id, self.listing_id, self.file_id)
    }
}

/// Requests a (re-)index of one listing. The indexing worker is the consumer;
/// producers are the gateway (on update) and the validation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexListingEvent {
    pub listing_id: String,
    pub trace_id: String,
}

impl IndexListingEvent {
    /// Listing-stable publish id; bursts of updates collapse on the bus.
    pub fn publish_id(&self) -> String {
        format!("index.{}", self.listing_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_validation_publish_id_is_composite() {
        let evt = StartFileValidationEvent {
            listing_id: "l1".into(),
            user_id: "u1".into(),
            trace_id: "t1".into(),
            file_id: "f1".into(),
            file_key: "2025/01/01/u1/d1/models/x.stl".into(),
            file_type: "model".into(),
        };
        assert_eq!(evt.publish_id(), "start.u1.l1.f1");
    }

    #[test]
    fn index_event_round_trips_as_json() {
        let evt = IndexListingEvent {
            listing_id: "abc".into(),
            trace_id: "xyz".into(),
        };
        let bytes = serde_json::to_vec(&evt).unwrap();
        let back: IndexListingEvent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, evt);
        assert_eq!(evt.publish_id(), "index.abc");
    }
}
