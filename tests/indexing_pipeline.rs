//! End-to-end indexing pipeline test: events published on the bus flow
//! through the worker service into the search index, with the ack/nack
//! policy observable at the handler boundary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use printbay_backend::config::EventConfig;
use printbay_backend::error::{AppError, Result};
use printbay_backend::events::memory::InMemoryBus;
use printbay_backend::events::{EventBus, EventPublisher, IndexListingEvent};
use printbay_backend::indexing::{IndexingService, ListingIndexSource};
use printbay_backend::models::{Listing, ListingStatus};
use printbay_backend::search::memory::InMemorySearchIndex;
use printbay_backend::search::LISTINGS_COLLECTION;

/// Minimal listing source backed by a map, standing in for Postgres.
#[derive(Default)]
struct MapSource {
    listings: Mutex<HashMap<Uuid, Listing>>,
    indexed: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl ListingIndexSource for MapSource {
    async fn listing_by_id(&self, id: Uuid) -> Result<Option<Listing>> {
        Ok(self.listings.lock().unwrap().get(&id).cloned())
    }

    async fn mark_indexed(&self, id: Uuid) -> Result<()> {
        self.indexed.lock().unwrap().push(id);
        Ok(())
    }
}

fn listing(id: Uuid) -> Listing {
    Listing {
        id,
        seller_id: Uuid::new_v4(),
        seller_name: "Jane Maker".into(),
        seller_username: "janemaker".into(),
        seller_verified: true,
        title: "Benchy Tugboat".into(),
        description: "The classic calibration tugboat".into(),
        price_min_unit: 0,
        currency: "gbp".into(),
        categories: vec!["calibration".into()],
        license: "standard".into(),
        client_id: "web".into(),
        trace_id: "trace".into(),
        thumbnail_path: Some("2025/02/02/u/d/images/benchy.png".into()),
        status: ListingStatus::Active,
        is_remixing_allowed: true,
        parent_listing_id: None,
        is_physical: true,
        total_weight_grams: Some(15),
        is_assembly_required: false,
        is_hardware_required: false,
        hardware_required: vec![],
        is_multicolor: false,
        dimensions_mm: Some(serde_json::json!({"width": 60.0, "depth": 31.0, "height": 48.0})),
        recommended_nozzle_temp_c: Some(205),
        recommended_materials: vec!["PLA".into(), "PETG".into()],
        is_ai_generated: false,
        ai_model_name: None,
        is_nsfw: false,
        likes_count: 10,
        downloads_count: 100,
        comments_count: 5,
        is_sale_active: false,
        sale_name: None,
        sale_price: None,
        sale_end_timestamp: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        last_indexed_at: None,
        deleted_at: None,
    }
}

fn events_config() -> EventConfig {
    EventConfig {
        start_image_validation: "file.image.start".into(),
        start_model_validation: "file.model.start".into(),
        index_listing: "listing.index".into(),
    }
}

async fn wire_pipeline(
    bus: &InMemoryBus,
    index: Arc<InMemorySearchIndex>,
    source: Arc<MapSource>,
) -> Arc<IndexingService> {
    let service = Arc::new(IndexingService::new(
        index,
        source,
        "http://cdn.example.com/public-files".to_string(),
    ));

    let handler_service = service.clone();
    bus.subscribe(
        "listing.index",
        "listings-worker",
        Arc::new(move |payload: Bytes| {
            let service = handler_service.clone();
            Box::pin(async move { service.handle_message(&payload).await })
        }),
    )
    .await
    .unwrap();

    service
}

#[tokio::test]
async fn published_event_lands_in_the_index() {
    let bus = Arc::new(InMemoryBus::new());
    let index = Arc::new(InMemorySearchIndex::new());
    let source = Arc::new(MapSource::default());

    let id = Uuid::new_v4();
    source.listings.lock().unwrap().insert(id, listing(id));

    wire_pipeline(&bus, index.clone(), source.clone()).await;

    let publisher = EventPublisher::new(bus.clone(), events_config());
    publisher
        .raise_index_listing(&IndexListingEvent {
            listing_id: id.to_string(),
            trace_id: "t1".into(),
        })
        .await
        .unwrap();

    let doc = index
        .get(LISTINGS_COLLECTION, &id.to_string())
        .expect("document should be indexed");
    assert_eq!(doc["title"], "Benchy Tugboat");
    assert_eq!(doc["seller_username"], "janemaker");
    assert_eq!(doc["dim_x_mm"], 60.0);
    assert_eq!(
        doc["thumbnail_url"],
        "http://cdn.example.com/public-files/2025/02/02/u/d/images/benchy.png"
    );
    assert_eq!(source.indexed.lock().unwrap().as_slice(), &[id]);
}

#[tokio::test]
async fn poison_pill_is_acked_and_ignored() {
    let bus = InMemoryBus::new();
    let index = Arc::new(InMemorySearchIndex::new());
    let source = Arc::new(MapSource::default());

    let service = wire_pipeline(&bus, index.clone(), source).await;

    // Direct handler invocation: malformed bytes must ack (Ok).
    service.handle_message(b"{ not json").await.unwrap();
    assert_eq!(index.len(LISTINGS_COLLECTION), 0);
}

#[tokio::test]
async fn engine_outage_propagates_as_nack() {
    let bus = InMemoryBus::new();
    let index = Arc::new(InMemorySearchIndex::new());
    let source = Arc::new(MapSource::default());

    let id = Uuid::new_v4();
    source.listings.lock().unwrap().insert(id, listing(id));
    index.set_failing(true);

    let service = wire_pipeline(&bus, index.clone(), source).await;

    let payload = serde_json::to_vec(&IndexListingEvent {
        listing_id: id.to_string(),
        trace_id: "t".into(),
    })
    .unwrap();

    let outcome = service.handle_message(&payload).await;
    assert!(matches!(outcome, Err(AppError::Search(_))));

    // Redelivery after recovery succeeds.
    index.set_failing(false);
    service.handle_message(&payload).await.unwrap();
    assert_eq!(index.len(LISTINGS_COLLECTION), 1);
}
