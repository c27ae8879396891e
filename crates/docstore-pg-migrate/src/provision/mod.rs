//! Schema provisioner: creates the catalog's tables phase by phase, then the
//! extras (trigger function, `updated_at` triggers, indexes, row security).

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::RelationalTarget;
use crate::error::{MigrateError, Result};
use crate::retry::{with_backoff, RetryPolicy};
use crate::schema::{ddl, Catalog, Phase};

/// Outcome of provisioning one phase.
#[derive(Debug)]
pub struct PhaseResult {
    pub phase: u32,
    pub succeeded: bool,
    /// Tables whose `CREATE TABLE IF NOT EXISTS` succeeded, in order.
    pub created_tables: Vec<String>,
    /// Always [`MigrateError::Ddl`] when set.
    pub error: Option<MigrateError>,
}

impl PhaseResult {
    fn new(phase: u32) -> Self {
        Self {
            phase,
            succeeded: true,
            created_tables: Vec::new(),
            error: None,
        }
    }

    fn fail(mut self, error: MigrateError) -> Self {
        self.succeeded = false;
        self.error = Some(error);
        self
    }
}

/// Outcome of the best-effort extras pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtrasResult {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    /// Table of the first failed statement.
    #[serde(skip)]
    first_failed_table: Option<String>,
}

impl ExtrasResult {
    fn record(&mut self, what: &str, outcome: Result<()>) {
        match outcome {
            Ok(()) => self.succeeded += 1,
            Err(e) => {
                warn!("Failed to create {}: {}", what, e);
                if let MigrateError::Ddl { table, .. } = &e {
                    self.first_failed_table.get_or_insert_with(|| table.clone());
                }
                self.failed += 1;
                self.errors.push(format!("{}: {}", what, e));
            }
        }
    }

    /// `Ok` only when every extra was created.
    ///
    /// The pass itself never stops early; this turns its counters into the
    /// provisioning outcome once it is done.
    pub fn outcome(&self) -> Result<()> {
        if self.failed == 0 {
            return Ok(());
        }
        Err(MigrateError::ddl(
            self.first_failed_table.as_deref().unwrap_or("extras"),
            format!(
                "{} of {} extras failed, first: {}",
                self.failed,
                self.succeeded + self.failed,
                self.errors.first().map(String::as_str).unwrap_or_default()
            ),
        ))
    }
}

/// Objects the catalog declares on one table that the target lacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableGaps {
    pub table: String,
    /// As `column -> referenced_table`.
    pub missing_foreign_keys: Vec<String>,
    pub missing_indexes: Vec<String>,
    pub missing_triggers: Vec<String>,
}

impl TableGaps {
    fn is_empty(&self) -> bool {
        self.missing_foreign_keys.is_empty()
            && self.missing_indexes.is_empty()
            && self.missing_triggers.is_empty()
    }
}

/// Result of [`Provisioner::verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    /// Catalog tables absent from the target, in phase order.
    pub missing_tables: Vec<String>,
    /// Existing tables with missing objects, in phase order.
    pub incomplete_tables: Vec<TableGaps>,
}

impl SchemaReport {
    pub fn is_complete(&self) -> bool {
        self.missing_tables.is_empty() && self.incomplete_tables.is_empty()
    }

    /// Missing tables plus every missing object.
    pub fn problem_count(&self) -> usize {
        self.missing_tables.len()
            + self
                .incomplete_tables
                .iter()
                .map(|g| {
                    g.missing_foreign_keys.len() + g.missing_indexes.len() + g.missing_triggers.len()
                })
                .sum::<usize>()
    }
}

/// Creates the destination schema in dependency order.
pub struct Provisioner {
    target: Arc<dyn RelationalTarget>,
    catalog: Catalog,
    schema: String,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Provisioner {
    pub fn new(target: Arc<dyn RelationalTarget>, catalog: Catalog, schema: impl Into<String>) -> Self {
        Self {
            target,
            catalog,
            schema: schema.into(),
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

    /// Create every table of `phase`, in order.
    ///
    /// Stops at the first failing table; tables created before it stay.
    /// Re-running a phase is harmless since every statement is
    /// `CREATE TABLE IF NOT EXISTS`.
    pub async fn provision_phase(&self, phase: &Phase) -> PhaseResult {
        info!(
            "Provisioning phase {} ({} tables)",
            phase.number,
            phase.tables.len()
        );
        let mut result = PhaseResult::new(phase.number);

        for table in &phase.tables {
            match self.run_ddl(table.name, ddl::create_table(table, &self.schema)).await {
                Ok(()) => {
                    debug!("Created table {}.{}", self.schema, table.name);
                    result.created_tables.push(table.name.to_string());
                }
                Err(e) => {
                    error!("Phase {} failed: {}", phase.number, e);
                    return result.fail(e);
                }
            }
        }

        info!(
            "Phase {} complete: {}",
            phase.number,
            result.created_tables.join(", ")
        );
        result
    }

    /// Provision a single phase by number.
    ///
    /// Unless `skip_dependency_check` is set, every table of every earlier
    /// phase must already exist; the first missing one fails the phase
    /// without running any DDL.
    pub async fn provision_phase_checked(
        &self,
        number: u32,
        skip_dependency_check: bool,
    ) -> Result<PhaseResult> {
        let phases = self.catalog.phases();
        let Some(phase) = phases.iter().find(|p| p.number == number) else {
            let known: Vec<String> = phases.iter().map(|p| p.number.to_string()).collect();
            return Err(MigrateError::Config(format!(
                "Unknown phase {} (known phases: {})",
                number,
                known.join(", ")
            )));
        };

        if !skip_dependency_check {
            for earlier in phases.iter().filter(|p| p.number < number) {
                for table in &earlier.tables {
                    if !self.table_exists(table.name).await? {
                        let err = MigrateError::ddl(
                            table.name,
                            format!(
                                "required by phase {} but missing (phase {} not provisioned)",
                                number, earlier.number
                            ),
                        );
                        error!("{}", err);
                        return Ok(PhaseResult::new(number).fail(err));
                    }
                }
            }
        }

        Ok(self.provision_phase(phase).await)
    }

    /// Provision every phase in ascending order, stopping at the first failure.
    pub async fn provision_all(&self) -> Vec<PhaseResult> {
        let mut results = Vec::new();
        for phase in self.catalog.phases() {
            let result = self.provision_phase(&phase).await;
            let failed = !result.succeeded;
            results.push(result);
            if failed {
                warn!("Stopping provisioning after phase {}", phase.number);
                break;
            }
        }
        results
    }

    /// Trigger function, `updated_at` triggers, indexes, row security and
    /// row policies. Every failure is logged and counted; none stops the rest.
    pub async fn provision_extras(&self) -> ExtrasResult {
        let mut result = ExtrasResult::default();

        let outcome = self
            .run_ddl(ddl::UPDATED_AT_FUNCTION, ddl::updated_at_function(&self.schema))
            .await;
        result.record("trigger function", outcome);

        for table in self.catalog.tables {
            let outcome = self
                .run_ddl(table.name, ddl::updated_at_trigger(table, &self.schema))
                .await;
            result.record(&format!("updated_at trigger on {}", table.name), outcome);
        }

        for index in self.catalog.indexes {
            let outcome = self
                .run_ddl(index.table, ddl::create_index(index, &self.schema))
                .await;
            result.record(&format!("index {}", index.name), outcome);
        }

        for table in self.catalog.tables.iter().filter(|t| t.row_security) {
            let outcome = self
                .run_ddl(table.name, ddl::enable_row_security(table.name, &self.schema))
                .await;
            result.record(&format!("row security on {}", table.name), outcome);
        }

        for def in self.catalog.policies {
            let outcome = with_backoff(self.retry, def.policy.name, &self.cancel, || {
                self.target.enable_row_policy(def.table, &def.policy)
            })
            .await
            .map_err(|e| MigrateError::ddl(def.table, e.message));
            result.record(&format!("policy \"{}\" on {}", def.policy.name, def.table), outcome);
        }

        info!(
            "Extras complete: {} succeeded, {} failed",
            result.succeeded, result.failed
        );
        result
    }

    /// Compare the target against the catalog: tables, then each existing
    /// table's foreign keys, indexes and `updated_at` trigger.
    pub async fn verify(&self) -> Result<SchemaReport> {
        let mut report = SchemaReport::default();
        for phase in self.catalog.phases() {
            for table in &phase.tables {
                if !self.table_exists(table.name).await? {
                    report.missing_tables.push(table.name.to_string());
                    continue;
                }

                let label = format!("object listing of {}", table.name);
                let objects = with_backoff(self.retry, &label, &self.cancel, || {
                    self.target.table_objects(table.name)
                })
                .await?;

                let mut gaps = TableGaps {
                    table: table.name.to_string(),
                    ..TableGaps::default()
                };
                for column in table.columns {
                    if let Some(fk) = column.references {
                        let key = (column.name.to_string(), fk.table.to_string());
                        if !objects.foreign_keys.contains(&key) {
                            gaps.missing_foreign_keys
                                .push(format!("{} -> {}", column.name, fk.table));
                        }
                    }
                }
                for index in self.catalog.indexes.iter().filter(|i| i.table == table.name) {
                    if !objects.indexes.contains(index.name) {
                        gaps.missing_indexes.push(index.name.to_string());
                    }
                }
                let trigger = ddl::updated_at_trigger_name(table.name);
                if !objects.triggers.contains(&trigger) {
                    gaps.missing_triggers.push(trigger);
                }

                if !gaps.is_empty() {
                    debug!("{} is incomplete: {:?}", table.name, gaps);
                    report.incomplete_tables.push(gaps);
                }
            }
        }

        if report.is_complete() {
            info!("All {} catalog tables and their objects exist", self.catalog.tables.len());
        } else {
            warn!(
                "Schema incomplete: {} tables missing, {} tables missing objects",
                report.missing_tables.len(),
                report.incomplete_tables.len()
            );
        }
        Ok(report)
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let label = format!("existence check of {}", table);
        Ok(with_backoff(self.retry, &label, &self.cancel, || {
            self.target.table_exists(table)
        })
        .await?)
    }

    /// Execute a rendered statement; render and execution failures both
    /// become [`MigrateError::Ddl`] for `table`.
    async fn run_ddl(&self, table: &str, statement: Result<String>) -> Result<()> {
        let statement = statement.map_err(|e| MigrateError::ddl(table, e.to_string()))?;
        let label = format!("DDL for {}", table);
        with_backoff(self.retry, &label, &self.cancel, || {
            self.target.execute_ddl(&statement)
        })
        .await
        .map_err(|e| MigrateError::ddl(table, e.message))
    }
}
