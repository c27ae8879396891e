//! In-memory document source for tests and embedding.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::core::{DocumentSource, RawRecord, StoreResult};
use crate::error::StoreError;

/// [`DocumentSource`] holding collections in memory.
///
/// Reads of a collection can be scripted to fail: queued errors are returned
/// one per read before the collection's documents are.
#[derive(Debug, Default)]
pub struct MemorySource {
    collections: BTreeMap<String, Vec<RawRecord>>,
    read_failures: Mutex<BTreeMap<String, VecDeque<StoreError>>>,
    reads: Mutex<BTreeMap<String, usize>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, name: &str, records: Vec<RawRecord>) -> Self {
        self.collections.insert(name.to_string(), records);
        self
    }

    /// Add a collection from `(id, fields)` pairs. Non-object fields are
    /// stored as an empty document.
    pub fn with_documents(self, name: &str, documents: Vec<(&str, Value)>) -> Self {
        let records = documents
            .into_iter()
            .map(|(id, fields)| match fields {
                Value::Object(map) => RawRecord::new(id, map),
                _ => RawRecord::new(id, Default::default()),
            })
            .collect();
        self.with_collection(name, records)
    }

    /// Fail the next reads of `collection` with these errors, in order.
    pub fn fail_reads(mut self, collection: &str, errors: Vec<StoreError>) -> Self {
        self.read_failures
            .get_mut()
            .entry(collection.to_string())
            .or_default()
            .extend(errors);
        self
    }

    /// Number of `read_all` calls made for `collection`, failed ones included.
    pub async fn read_count(&self, collection: &str) -> usize {
        self.reads
            .lock()
            .await
            .get(collection)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentSource for MemorySource {
    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        Ok(self.collections.keys().cloned().collect())
    }

    async fn read_all(&self, collection: &str) -> StoreResult<Vec<RawRecord>> {
        *self
            .reads
            .lock()
            .await
            .entry(collection.to_string())
            .or_default() += 1;

        let failure = self
            .read_failures
            .lock()
            .await
            .get_mut(collection)
            .and_then(VecDeque::pop_front);
        if let Some(err) = failure {
            return Err(err);
        }

        Ok(self
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }
}
