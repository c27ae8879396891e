//! Run summary and the persisted run artifact.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::orchestrator::{CollectionStatus, MigrationResult};

/// Totals across every collection of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub collections: usize,
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub extracted: usize,
    pub dropped: usize,
    pub attempted: usize,
    pub inserted: usize,
    pub failed_records: usize,
}

/// Result of `run_all`, also the JSON document written as the run artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// SHA256 of the configuration the run used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,

    #[serde(default)]
    pub dry_run: bool,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: f64,

    /// Inserted rows per second over the whole run.
    pub rows_per_second: i64,

    pub totals: RunTotals,

    /// No collection failed or was cancelled, and every collection that had
    /// documents inserted at least one row.
    pub success: bool,

    pub collections: Vec<MigrationResult>,
}

impl RunSummary {
    /// Summarize finished collection results.
    pub fn new(run_id: impl Into<String>, started_at: DateTime<Utc>, results: Vec<MigrationResult>) -> Self {
        let finished_at = Utc::now();
        let duration_seconds = (finished_at - started_at).num_milliseconds().max(0) as f64 / 1000.0;

        let mut totals = RunTotals {
            collections: results.len(),
            ..RunTotals::default()
        };
        for r in &results {
            match r.status {
                CollectionStatus::Done => totals.done += 1,
                CollectionStatus::Skipped => totals.skipped += 1,
                CollectionStatus::Failed => totals.failed += 1,
                CollectionStatus::Cancelled => totals.cancelled += 1,
                _ => {}
            }
            totals.extracted += r.total_extracted;
            totals.dropped += r.dropped;
            totals.attempted += r.attempted;
            totals.inserted += r.inserted;
            totals.failed_records += r.failed;
        }

        let success = totals.failed == 0
            && totals.cancelled == 0
            && !results.iter().any(MigrationResult::inserted_nothing);

        let rows_per_second = if duration_seconds > 0.0 {
            (totals.inserted as f64 / duration_seconds) as i64
        } else {
            totals.inserted as i64
        };

        Self {
            run_id: run_id.into(),
            config_hash: None,
            dry_run: false,
            started_at,
            finished_at,
            duration_seconds,
            rows_per_second,
            totals,
            success,
            collections: results,
        }
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn was_cancelled(&self) -> bool {
        self.totals.cancelled > 0
    }

    /// Collections that failed or had documents but inserted no rows.
    pub fn problem_collections(&self) -> Vec<&str> {
        self.collections
            .iter()
            .filter(|r| r.status == CollectionStatus::Failed || r.inserted_nothing())
            .map(|r| r.source_collection.as_str())
            .collect()
    }

    /// `Ok` for a successful run, otherwise the error the CLI exits with.
    pub fn outcome(&self) -> Result<()> {
        if self.was_cancelled() {
            return Err(MigrateError::Cancelled);
        }
        if !self.success {
            return Err(MigrateError::Incomplete(format!(
                "collections with problems: {}",
                self.problem_collections().join(", ")
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable summary for the console.
    /// Human-readable summary, as printed at the end of a run.
    pub fn render_text(&self) -> String {
        self.to_string()
    }

    /// Write the summary as JSON (atomic: temp file, then rename).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = self.to_json()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heading = match (self.dry_run, self.success) {
            (true, true) => "Dry run completed!",
            (true, false) => "Dry run finished with problems",
            (false, true) => "Migration completed!",
            (false, false) => "Migration finished with problems",
        };
        writeln!(f, "\n{}", heading)?;
        writeln!(f, "  Run ID: {}", self.run_id)?;
        writeln!(f, "  Duration: {:.2}s", self.duration_seconds)?;
        writeln!(
            f,
            "  Collections: {} done, {} skipped, {} failed, {} cancelled",
            self.totals.done, self.totals.skipped, self.totals.failed, self.totals.cancelled
        )?;
        writeln!(
            f,
            "  Records: {} extracted, {} dropped, {} inserted, {} failed",
            self.totals.extracted, self.totals.dropped, self.totals.inserted, self.totals.failed_records
        )?;
        writeln!(f, "  Throughput: {} rows/sec", self.rows_per_second)?;

        writeln!(f)?;
        for r in &self.collections {
            let table = r.target_table.as_deref().unwrap_or("-");
            writeln!(
                f,
                "  {:<26} -> {:<24} {:<9} extracted {:>6}  inserted {:>6}  failed {:>6}  dropped {:>5}",
                r.source_collection,
                table,
                r.status.as_str(),
                r.total_extracted,
                r.inserted,
                r.failed,
                r.dropped
            )?;
            for e in &r.errors {
                writeln!(f, "      {}", e)?;
            }
        }
        Ok(())
    }
}
