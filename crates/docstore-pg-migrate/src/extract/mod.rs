//! Extractor: reads whole collections from the document source.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::{DocumentSource, RawRecord};
use crate::error::{MigrateError, Result};
use crate::retry::{with_backoff, RetryPolicy};

/// Pulls every document of a collection into memory.
pub struct Extractor {
    source: Arc<dyn DocumentSource>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Extractor {
    pub fn new(source: Arc<dyn DocumentSource>) -> Self {
        Self {
            source,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Every document of `collection`. An empty collection is `Ok(vec![])`.
    ///
    /// Transient source errors are retried; whatever is left becomes
    /// [`MigrateError::Extraction`].
    pub async fn extract(&self, collection: &str) -> Result<Vec<RawRecord>> {
        debug!("Extracting collection {}", collection);
        let label = format!("read of {}", collection);
        let records = with_backoff(self.retry, &label, &self.cancel, || {
            self.source.read_all(collection)
        })
        .await
        .map_err(|e| MigrateError::extraction(collection, e.message))?;

        info!("Extracted {} documents from {}", records.len(), collection);
        Ok(records)
    }

    /// Collection names the source holds.
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        with_backoff(self.retry, "collection listing", &self.cancel, || {
            self.source.list_collections()
        })
        .await
        .map_err(MigrateError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::source::MemorySource;
    use serde_json::json;
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_empty_collection_is_not_an_error() {
        let extractor = Extractor::new(Arc::new(MemorySource::new()));
        assert!(extractor.extract("users").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_retried() {
        let source = Arc::new(
            MemorySource::new()
                .with_documents("users", vec![("u1", json!({"email": "a@x"}))])
                .fail_reads("users", vec![StoreError::transient("unavailable")]),
        );
        let extractor = Extractor::new(source.clone()).with_retry(fast_retry());

        let records = extractor.extract("users").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(source.read_count("users").await, 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_extraction_error() {
        let source = Arc::new(
            MemorySource::new()
                .fail_reads("users", vec![StoreError::permanent("permission denied")]),
        );
        let extractor = Extractor::new(source.clone()).with_retry(fast_retry());

        match extractor.extract("users").await {
            Err(MigrateError::Extraction {
                collection,
                message,
            }) => {
                assert_eq!(collection, "users");
                assert_eq!(message, "permission denied");
            }
            other => panic!("expected extraction error, got {:?}", other),
        }
        assert_eq!(source.read_count("users").await, 1);
    }
}
