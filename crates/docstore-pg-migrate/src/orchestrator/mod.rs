//! Migration orchestrator: runs extract, transform and load per collection.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, MigrationConfig};
use crate::core::{DocumentSource, RelationalTarget};
use crate::error::Result;
use crate::extract::Extractor;
use crate::load::{Loader, ProgressCallback};
use crate::mapping::CollectionMapper;
use crate::provision::Provisioner;
use crate::report::RunSummary;
use crate::retry::RetryPolicy;
use crate::schema::Catalog;
use crate::source::JsonExportSource;
use crate::target::{MemoryTarget, PostgresTarget};
use crate::transform::Transformer;

/// Where a collection is in its migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Pending,
    Extracting,
    Transforming,
    Loading,
    Done,
    /// No mapping, or nothing to migrate.
    Skipped,
    /// Extraction failed.
    Failed,
    Cancelled,
}

impl CollectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionStatus::Pending => "pending",
            CollectionStatus::Extracting => "extracting",
            CollectionStatus::Transforming => "transforming",
            CollectionStatus::Loading => "loading",
            CollectionStatus::Done => "done",
            CollectionStatus::Skipped => "skipped",
            CollectionStatus::Failed => "failed",
            CollectionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CollectionStatus::Done
                | CollectionStatus::Skipped
                | CollectionStatus::Failed
                | CollectionStatus::Cancelled
        )
    }

    /// Allowed state machine edges.
    pub fn can_transition_to(self, next: CollectionStatus) -> bool {
        use CollectionStatus::*;
        matches!(
            (self, next),
            (Pending, Extracting)
                | (Pending, Skipped)
                | (Pending, Cancelled)
                | (Extracting, Transforming)
                | (Extracting, Skipped)
                | (Extracting, Failed)
                | (Extracting, Cancelled)
                | (Transforming, Loading)
                | (Transforming, Cancelled)
                | (Loading, Done)
                | (Loading, Cancelled)
        )
    }
}

/// Outcome of migrating one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    #[serde(rename = "collection")]
    pub source_collection: String,

    #[serde(rename = "table")]
    pub target_table: Option<String>,

    pub status: CollectionStatus,

    #[serde(rename = "extracted")]
    pub total_extracted: usize,

    pub transformed: usize,
    pub dropped: usize,
    pub attempted: usize,
    pub inserted: usize,
    pub failed: usize,

    /// Mapping, extraction and batch errors.
    pub errors: Vec<String>,

    /// One entry per dropped record.
    pub drop_reasons: Vec<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl MigrationResult {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            source_collection: collection.into(),
            target_table: None,
            status: CollectionStatus::Pending,
            total_extracted: 0,
            transformed: 0,
            dropped: 0,
            attempted: 0,
            inserted: 0,
            failed: 0,
            errors: Vec::new(),
            drop_reasons: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// The collection had documents but not a single row made it in.
    pub fn inserted_nothing(&self) -> bool {
        self.status != CollectionStatus::Skipped && self.total_extracted > 0 && self.inserted == 0
    }

    fn advance(&mut self, next: CollectionStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "{:?} -> {:?}",
            self.status,
            next
        );
        debug!(
            "{}: {} -> {}",
            self.source_collection,
            self.status.as_str(),
            next.as_str()
        );
        self.status = next;
    }

    fn finish(mut self, status: CollectionStatus) -> Self {
        self.advance(status);
        self.finished_at = Some(Utc::now());
        self
    }
}

/// Knobs for a run, usually taken from [`MigrationConfig`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub retry: RetryPolicy,
    /// Collections `run_all` migrates; empty means every mapped collection.
    pub collections: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&MigrationConfig::default())
    }
}

impl RunOptions {
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self {
            batch_size: config.get_batch_size(),
            batch_delay: config.get_batch_delay(),
            retry: config.retry_policy(),
            collections: config.collections.clone(),
        }
    }
}

/// Migration orchestrator.
pub struct Orchestrator {
    extractor: Extractor,
    transformer: Transformer,
    loader: Loader,
    mapper: CollectionMapper,
    options: RunOptions,
    cancel: CancellationToken,
    config_hash: Option<String>,
    dry_run: bool,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        target: Arc<dyn RelationalTarget>,
        mapper: CollectionMapper,
        transformer: Transformer,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> Self {
        let extractor = Extractor::new(source)
            .with_retry(options.retry)
            .with_cancel(cancel.clone());
        let loader = Loader::new(target)
            .with_batch_delay(options.batch_delay)
            .with_retry(options.retry)
            .with_cancel(cancel.clone());
        Self {
            extractor,
            transformer,
            loader,
            mapper,
            options,
            cancel,
            config_hash: None,
            dry_run: false,
        }
    }

    /// Build an orchestrator from configuration.
    ///
    /// A dry run loads into an in-memory target provisioned with the full
    /// catalog, so constraint violations still show up without touching
    /// PostgreSQL.
    pub async fn from_config(config: &Config, dry_run: bool, cancel: CancellationToken) -> Result<Self> {
        let source: Arc<dyn DocumentSource> = Arc::new(JsonExportSource::new(&config.source.path));
        let options = RunOptions::from_config(&config.migration);

        let target: Arc<dyn RelationalTarget> = if dry_run {
            info!("Dry run: loading into an in-memory target");
            let memory = Arc::new(MemoryTarget::new(&config.target.schema));
            let phases = Provisioner::new(memory.clone(), Catalog::builtin(), &config.target.schema)
                .with_retry(options.retry)
                .provision_all()
                .await;
            if let Some(err) = phases.into_iter().find_map(|p| p.error) {
                return Err(err);
            }
            memory
        } else {
            Arc::new(PostgresTarget::connect(&config.target).await?)
        };

        let mapper = CollectionMapper::builtin().with_extra(&config.migration.extra_mappings);
        let transformer = Transformer::new(Catalog::builtin(), Utc::now())
            .with_boolean_defaults(config.transform.boolean_defaults.clone());

        let mut orchestrator = Self::new(source, target, mapper, transformer, options, cancel)
            .with_config_hash(config.hash());
        orchestrator.dry_run = dry_run;
        Ok(orchestrator)
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Receive a callback after every loaded batch.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.loader = self.loader.with_progress(progress);
        self
    }

    /// Migrate one collection.
    ///
    /// Never fails as a whole: every problem ends up in the result's status
    /// and error lists.
    pub async fn run_collection(&self, collection: &str) -> MigrationResult {
        let mut result = MigrationResult::new(collection);

        if self.cancel.is_cancelled() {
            return result.finish(CollectionStatus::Cancelled);
        }

        let table = match self.mapper.resolve(collection) {
            Ok(table) => table.to_string(),
            Err(e) => {
                info!("Skipping {}: {}", collection, e);
                result.errors.push(e.to_string());
                return result.finish(CollectionStatus::Skipped);
            }
        };
        result.target_table = Some(table.clone());

        result.advance(CollectionStatus::Extracting);
        let records = match self.extractor.extract(collection).await {
            Ok(records) => records,
            Err(e) => {
                if self.cancel.is_cancelled() {
                    warn!("{}: extraction interrupted by cancellation", collection);
                    return result.finish(CollectionStatus::Cancelled);
                }
                error!("{}", e);
                result.errors.push(e.to_string());
                return result.finish(CollectionStatus::Failed);
            }
        };
        result.total_extracted = records.len();
        if records.is_empty() {
            info!("Skipping {}: no documents", collection);
            return result.finish(CollectionStatus::Skipped);
        }

        result.advance(CollectionStatus::Transforming);
        let output = self.transformer.transform(collection, &records);
        result.transformed = output.records.len();
        result.dropped = output.dropped.len();
        result.drop_reasons = output
            .dropped
            .into_iter()
            .map(|d| d.into_error(collection).to_string())
            .collect();
        info!(
            "Transformed {}: {} rows, {} dropped",
            collection, result.transformed, result.dropped
        );

        if self.cancel.is_cancelled() {
            return result.finish(CollectionStatus::Cancelled);
        }

        result.advance(CollectionStatus::Loading);
        let batch = self
            .loader
            .load(&table, &output.records, self.options.batch_size)
            .await;
        result.attempted = batch.attempted;
        result.inserted = batch.inserted;
        result.failed = batch.failed;
        result.errors.extend(batch.errors);

        info!(
            "{} -> {}: {} inserted, {} failed, {} dropped",
            collection, table, result.inserted, result.failed, result.dropped
        );
        if batch.cancelled {
            result.finish(CollectionStatus::Cancelled)
        } else {
            result.finish(CollectionStatus::Done)
        }
    }

    /// Migrate every selected collection, one at a time.
    ///
    /// Mapped collections run in mapping order. Without an include list,
    /// source collections that have no mapping are reported as skipped.
    pub async fn run_all(&self) -> RunSummary {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {}", run_id);

        let include = &self.options.collections;
        let mut selected: Vec<String> = self
            .mapper
            .collections()
            .filter(|c| include.is_empty() || include.iter().any(|i| i == c))
            .map(str::to_string)
            .collect();
        for name in include {
            if !selected.contains(name) {
                selected.push(name.clone());
            }
        }

        let mut results = Vec::with_capacity(selected.len());
        for collection in &selected {
            if self.cancel.is_cancelled() {
                warn!("Cancelled before {}", collection);
            }
            results.push(self.run_collection(collection).await);
        }

        if include.is_empty() && !self.cancel.is_cancelled() {
            match self.extractor.list_collections().await {
                Ok(names) => {
                    for name in names.iter().filter(|n| !self.mapper.contains(n)) {
                        results.push(self.run_collection(name).await);
                    }
                }
                Err(e) => warn!("Could not list source collections: {}", e),
            }
        }

        let mut summary = RunSummary::new(run_id, started_at, results).with_dry_run(self.dry_run);
        if let Some(hash) = &self.config_hash {
            summary = summary.with_config_hash(hash.clone());
        }
        info!(
            "Run {} finished in {:.2}s: {} inserted, {} failed, {} dropped",
            summary.run_id,
            summary.duration_seconds,
            summary.totals.inserted,
            summary.totals.failed_records,
            summary.totals.dropped
        );
        summary
    }
}
