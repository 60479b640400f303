//! In-memory event bus used by tests.
//!
//! Mirrors the durable bus contract closely enough for handler tests:
//! one delivery per queue group, publish-id dedupe, and a record of every
//! published message for assertions.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::events::{EventBus, MessageHandler};

/// A message captured by [`InMemoryBus::publish`].
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub subject: String,
    pub msg_id: String,
    pub payload: Bytes,
}

#[derive(Default)]
struct Inner {
    // subject -> group -> handler
    subscriptions: HashMap<String, HashMap<String, MessageHandler>>,
    published: Vec<PublishedMessage>,
    seen_msg_ids: HashSet<String>,
}

/// Test double for the durable bus.
#[derive(Default)]
pub struct InMemoryBus {
    inner: Mutex<Inner>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message published so far, in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.inner.lock().unwrap().published.clone()
    }

    /// Messages published to one subject.
    pub fn published_to(&self, subject: &str) -> Vec<PublishedMessage> {
        self.inner
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Bytes, msg_id: &str) -> Result<()> {
        let handlers: Vec<MessageHandler> = {
            let mut inner = self.inner.lock().unwrap();

            // Publish-id dedupe, as the durable bus would do within its window.
            if !inner.seen_msg_ids.insert(msg_id.to_string()) {
                return Ok(());
            }

            inner.published.push(PublishedMessage {
                subject: subject.to_string(),
                msg_id: msg_id.to_string(),
                payload: payload.clone(),
            });

            inner
                .subscriptions
                .get(subject)
                .map(|groups| groups.values().cloned().collect())
                .unwrap_or_default()
        };

        // One delivery per group. Handler errors are swallowed here the way a
        // nack would be: the test double does not redeliver.
        for handler in handlers {
            let _ = handler(payload.clone()).await;
        }
        Ok(())
    }

    async fn subscribe(&self, subject: &str, group: &str, handler: MessageHandler) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .entry(subject.to_string())
            .or_default()
            .insert(group.to_string(), handler);
        Ok(())
    }

    async fn drain(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn delivers_once_per_group() {
        let bus = InMemoryBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        bus.subscribe(
            "test.subject",
            "workers",
            Arc::new(move |_payload| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        )
        .await
        .unwrap();

        bus.publish("test.subject", Bytes::from_static(b"{}"), "m1")
            .await
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.published_to("test.subject").len(), 1);
    }

    #[tokio::test]
    async fn dedupes_by_publish_id() {
        let bus = InMemoryBus::new();
        bus.publish("s", Bytes::from_static(b"a"), "same-id")
            .await
            .unwrap();
        bus.publish("s", Bytes::from_static(b"b"), "same-id")
            .await
            .unwrap();
        assert_eq!(bus.published().len(), 1);
    }
}
