//! Loader: inserts transformed records into one table in fixed-size batches.
//!
//! Batches are issued in order, one bulk insert each, with a fixed pause in
//! between. A rejected batch is counted as failed and loading moves on, so a
//! single bad record costs at most its own batch.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{RelationalTarget, TransformedRecord};
use crate::error::MigrateError;
use crate::retry::{with_backoff, RetryPolicy};

/// Outcome of loading one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Records handed to the target, successfully or not.
    pub attempted: usize,

    /// Records the target accepted.
    pub inserted: usize,

    /// Records in rejected batches.
    pub failed: usize,

    /// One message per rejected batch.
    pub errors: Vec<String>,

    /// Loading stopped at a batch boundary because the run was cancelled.
    #[serde(default)]
    pub cancelled: bool,
}

impl BatchResult {
    fn record_success(&mut self, count: usize) {
        self.attempted += count;
        self.inserted += count;
    }

    fn record_failure(&mut self, count: usize, error: MigrateError) {
        self.attempted += count;
        self.failed += count;
        self.errors.push(error.to_string());
    }
}

/// Snapshot passed to the progress callback after every batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadProgress {
    pub table: String,
    /// 1-based number of the batch just finished.
    pub batch: usize,
    pub batches: usize,
    pub attempted_so_far: usize,
    pub inserted_so_far: usize,
    pub total: usize,
}

/// Callback invoked after every batch.
pub type ProgressCallback = Arc<dyn Fn(&LoadProgress) + Send + Sync>;

/// Writes records to the relational target batch by batch.
pub struct Loader {
    target: Arc<dyn RelationalTarget>,
    batch_delay: Duration,
    retry: RetryPolicy,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl Loader {
    pub fn new(target: Arc<dyn RelationalTarget>) -> Self {
        Self {
            target,
            batch_delay: Duration::ZERO,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Pause between consecutive batches (not after the last one).
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Insert `records` into `table`, `batch_size` records per call.
    ///
    /// Never fails as a whole: rejected batches land in
    /// [`BatchResult::failed`] and [`BatchResult::errors`]. A batch size of
    /// zero is treated as one.
    pub async fn load(
        &self,
        table: &str,
        records: &[TransformedRecord],
        batch_size: usize,
    ) -> BatchResult {
        let batch_size = batch_size.max(1);
        let total = records.len();
        let batches = total.div_ceil(batch_size);
        let mut result = BatchResult::default();

        debug!(
            "Loading {} records into {} in {} batches of {}",
            total, table, batches, batch_size
        );

        for (index, chunk) in records.chunks(batch_size).enumerate() {
            let batch = index + 1;

            if index > 0 && !self.batch_delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.batch_delay) => {}
                }
            }
            if self.cancel.is_cancelled() {
                warn!(
                    "{}: cancelled before batch {}/{}, {} records not attempted",
                    table,
                    batch,
                    batches,
                    total - result.attempted
                );
                result.cancelled = true;
                break;
            }

            let label = format!("insert of batch {} into {}", batch, table);
            match with_backoff(self.retry, &label, &self.cancel, || {
                self.target.bulk_insert(table, chunk)
            })
            .await
            {
                Ok(count) => {
                    if count as usize != chunk.len() {
                        debug!(
                            "{}: batch {} reported {} rows for {} records",
                            table,
                            batch,
                            count,
                            chunk.len()
                        );
                    }
                    result.record_success(chunk.len());
                }
                Err(e) => {
                    let error = MigrateError::BatchInsert {
                        table: table.to_string(),
                        batch,
                        message: e.message,
                    };
                    warn!("{}", error);
                    result.record_failure(chunk.len(), error);
                }
            }

            info!(
                "{}: batch {}/{} done, {}/{} records attempted",
                table, batch, batches, result.attempted, total
            );
            if let Some(progress) = &self.progress {
                progress(&LoadProgress {
                    table: table.to_string(),
                    batch,
                    batches,
                    attempted_so_far: result.attempted,
                    inserted_so_far: result.inserted,
                    total,
                });
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ColumnValue;
    use crate::error::StoreError;
    use crate::target::MemoryTarget;
    use std::sync::Mutex;

    fn transfer(id: usize, transfer_id: &str) -> TransformedRecord {
        let mut record = TransformedRecord::new(format!("doc{}", id));
        record.set("transfer_id", ColumnValue::Text(transfer_id.to_string()));
        record.set("amount", ColumnValue::Numeric(10.0));
        record
    }

    fn transfers(count: usize) -> Vec<TransformedRecord> {
        (0..count).map(|i| transfer(i, &format!("t{}", i))).collect()
    }

    fn table() -> MemoryTarget {
        MemoryTarget::new("public").with_table(
            "transactions_mangopay",
            &["transfer_id", "amount"],
            &[&["transfer_id"]],
        )
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    fn assert_consistent(result: &BatchResult) {
        assert_eq!(result.inserted + result.failed, result.attempted);
    }

    #[tokio::test]
    async fn test_second_batch_rejected() {
        let target = Arc::new(
            table().fail_bulk_insert(2, StoreError::permanent("violates check constraint")),
        );
        let loader = Loader::new(target.clone()).with_retry(fast_retry());

        let result = loader.load("transactions_mangopay", &transfers(5), 2).await;

        assert_eq!(result.attempted, 5);
        assert_eq!(result.inserted, 3);
        assert_eq!(result.failed, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Batch 2 rejected by table transactions_mangopay"));
        assert!(!result.cancelled);
        assert_consistent(&result);
        assert_eq!(target.bulk_insert_calls().await, 3);
        assert_eq!(target.row_count("transactions_mangopay").await, 3);
    }

    #[tokio::test]
    async fn test_duplicate_key_fails_whole_batch() {
        let target = Arc::new(table());
        let loader = Loader::new(target.clone());

        let mut records = transfers(50);
        records[49] = transfer(49, "t0");
        let result = loader.load("transactions_mangopay", &records, 50).await;

        assert_eq!(
            (result.attempted, result.inserted, result.failed),
            (50, 0, 50)
        );
        assert!(result.errors[0].contains("duplicate key value"));
        // constraint rejections are not retried
        assert_eq!(target.bulk_insert_calls().await, 1);
        assert_eq!(target.row_count("transactions_mangopay").await, 0);
    }

    #[tokio::test]
    async fn test_transient_error_retried() {
        let target = Arc::new(
            table().fail_bulk_insert(1, StoreError::transient("connection reset by peer")),
        );
        let loader = Loader::new(target.clone()).with_retry(fast_retry());

        let result = loader.load("transactions_mangopay", &transfers(3), 10).await;

        assert_eq!(result.inserted, 3);
        assert!(result.errors.is_empty());
        assert_eq!(target.bulk_insert_calls().await, 2);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let target = Arc::new(table());
        let result = Loader::new(target.clone())
            .load("transactions_mangopay", &[], 10)
            .await;
        assert_eq!(result, BatchResult::default());
        assert_eq!(target.bulk_insert_calls().await, 0);
    }

    #[tokio::test]
    async fn test_progress_reported_per_batch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let loader = Loader::new(Arc::new(table())).with_progress(Arc::new(move |p: &LoadProgress| {
            sink.lock()
                .unwrap()
                .push((p.batch, p.batches, p.attempted_so_far, p.total));
        }));

        loader.load("transactions_mangopay", &transfers(5), 2).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(1, 3, 2, 5), (2, 3, 4, 5), (3, 3, 5, 5)]
        );
    }

    #[tokio::test]
    async fn test_cancel_stops_at_batch_boundary() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let target = Arc::new(table());
        let loader = Loader::new(target.clone())
            .with_cancel(cancel)
            .with_progress(Arc::new(move |p: &LoadProgress| {
                if p.batch == 2 {
                    trigger.cancel();
                }
            }));

        let result = loader.load("transactions_mangopay", &transfers(7), 2).await;

        assert!(result.cancelled);
        assert_eq!(result.attempted, 4);
        assert_eq!(result.inserted, 4);
        assert_consistent(&result);
        assert_eq!(target.bulk_insert_calls().await, 2);
    }

    #[tokio::test]
    async fn test_delay_only_between_batches() {
        let delay = Duration::from_millis(40);

        let loader = Loader::new(Arc::new(table())).with_batch_delay(delay);
        let start = std::time::Instant::now();
        loader.load("transactions_mangopay", &transfers(6), 2).await;
        assert!(start.elapsed() >= delay * 2);

        let loader = Loader::new(Arc::new(table())).with_batch_delay(Duration::from_secs(30));
        let start = std::time::Instant::now();
        let result = loader.load("transactions_mangopay", &transfers(2), 2).await;
        assert_eq!(result.inserted, 2);
        assert!(start.elapsed() < Duration::from_secs(30));
    }
}
