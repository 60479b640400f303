//! In-memory search index used by tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::search::SearchIndex;

/// Test double storing documents per collection, keyed by their `id` field.
/// Can be told to fail to exercise transient-error paths.
#[derive(Default)]
pub struct InMemorySearchIndex {
    collections: Mutex<HashMap<String, HashMap<String, serde_json::Value>>>,
    fail_upserts: Mutex<bool>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent upserts fail, simulating an engine outage.
    pub fn set_failing(&self, failing: bool) {
        *self.fail_upserts.lock().unwrap() = failing;
    }

    /// Fetch a stored document for assertions.
    pub fn get(&self, collection: &str, id: &str) -> Option<serde_json::Value> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, collection: &str, document: &serde_json::Value) -> Result<()> {
        if *self.fail_upserts.lock().unwrap() {
            return Err(AppError::Search("simulated engine outage".into()));
        }

        let id = document
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::Search("document missing id".into()))?
            .to_string();

        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(id, document.clone());
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        if let Some(docs) = self.collections.lock().unwrap().get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
