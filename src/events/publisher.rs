//! Typed event publishing with per-kind subject routing.

use std::sync::Arc;

use bytes::Bytes;

use crate::config::EventConfig;
use crate::error::{AppError, Result};
use crate::events::{EventBus, IndexListingEvent, StartFileValidationEvent};

/// Publishes domain events to their configured subjects.
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    config: EventConfig,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>, config: EventConfig) -> Self {
        Self { bus, config }
    }

    /// Publish a file-validation start event, routed by file kind.
    pub async fn raise_start_file_validation(
        &self,
        event: &StartFileValidationEvent,
    ) -> Result<()> {
        tracing::info!(
            listing_id = %event.listing_id,
            user_id = %event.user_id,
            file_id = %event.file_id,
            file_type = %event.file_type,
            "Raising file validation event"
        );

        let subject = match event.file_type.as_str() {
            "image" => &self.config.start_image_validation,
            "model" => &self.config.start_model_validation,
            other => {
                return Err(AppError::Bus(format!(
                    "Unsupported file type for validation event: {}",
                    other
                )))
            }
        };

        let payload = Bytes::from(serde_json::to_vec(event)?);
        self.bus
            .publish(subject, payload, &event.publish_id())
            .await
    }

    /// Publish a listing (re-)index event.
    pub async fn raise_index_listing(&self, event: &IndexListingEvent) -> Result<()> {
        tracing::info!(listing_id = %event.listing_id, "Raising listing index event");

        let payload = Bytes::from(serde_json::to_vec(event)?);
        self.bus
            .publish(&self.config.index_listing, payload, &event.publish_id())
            .await
    }
}
