//! Connectivity checks against both stores.

use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::core::{DocumentSource, RelationalTarget};
use crate::source::JsonExportSource;
use crate::target::{MemoryTarget, PostgresTarget};

/// Outcome of [`check`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    /// Collections the source lists; 0 when it cannot be reached.
    pub source_collections: usize,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

impl HealthCheckResult {
    fn finish(mut self) -> Self {
        self.healthy = self.source_connected && self.target_connected;
        if self.healthy {
            info!(
                "Health check passed: {} source collections, target reachable",
                self.source_collections
            );
        } else {
            warn!(
                "Health check failed: source={:?} target={:?}",
                self.source_error, self.target_error
            );
        }
        self
    }

    fn target_failed(mut self, error: String, latency_ms: u64) -> Self {
        self.target_connected = false;
        self.target_latency_ms = latency_ms;
        self.target_error = Some(error);
        self
    }
}

/// List the source's collections and ping the target.
pub async fn check(source: &dyn DocumentSource, target: &dyn RelationalTarget) -> HealthCheckResult {
    let mut result = check_source(source).await;

    let start = Instant::now();
    match target.ping().await {
        Ok(()) => {
            result.target_connected = true;
            result.target_latency_ms = elapsed_ms(start);
        }
        Err(e) => result = result.target_failed(e.to_string(), elapsed_ms(start)),
    }
    result.finish()
}

/// Check the stores named by `config`.
///
/// With `dry_run` the target is an empty in-memory store, so only the
/// source is really exercised. A PostgreSQL pool that cannot be built or
/// connected is reported as an unreachable target, not returned as an error.
pub async fn check_config(config: &Config, dry_run: bool) -> HealthCheckResult {
    let source = JsonExportSource::new(&config.source.path);
    if dry_run {
        return check(&source, &MemoryTarget::new(&config.target.schema)).await;
    }

    let start = Instant::now();
    match PostgresTarget::connect(&config.target).await {
        Ok(target) => check(&source, &target).await,
        Err(e) => check_source(&source)
            .await
            .target_failed(e.to_string(), elapsed_ms(start))
            .finish(),
    }
}

async fn check_source(source: &dyn DocumentSource) -> HealthCheckResult {
    let mut result = HealthCheckResult::default();
    let start = Instant::now();
    match source.list_collections().await {
        Ok(collections) => {
            result.source_connected = true;
            result.source_collections = collections.len();
        }
        Err(e) => result.source_error = Some(e.to_string()),
    }
    result.source_latency_ms = elapsed_ms(start);
    result
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
