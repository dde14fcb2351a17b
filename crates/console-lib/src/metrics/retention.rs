//! Age-based pruning of the metrics history

use crate::error::Result;
use crate::observability::{ConsoleMetrics, StructuredLogger};
use crate::store::MetricsStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Samples older than this are deleted by default
pub const DEFAULT_HORIZON_HOURS: i64 = 72;

pub struct Pruner {
    store: Arc<dyn MetricsStore>,
    horizon_hours: i64,
    metrics: ConsoleMetrics,
    logger: StructuredLogger,
}

impl Pruner {
    pub fn new(store: Arc<dyn MetricsStore>, horizon_hours: i64, logger: StructuredLogger) -> Self {
        Self {
            store,
            horizon_hours,
            metrics: ConsoleMetrics::new(),
            logger,
        }
    }

    pub fn horizon(&self) -> Duration {
        Duration::hours(self.horizon_hours)
    }

    /// Delete samples strictly older than the configured horizon
    pub async fn clear_history_replica_metrics(&self) -> Result<u64> {
        self.prune_older_than(self.horizon()).await
    }

    /// Delete samples strictly older than `now - horizon`
    pub async fn prune_older_than(&self, horizon: Duration) -> Result<u64> {
        self.prune_at(Utc::now(), horizon).await
    }

    /// Prune relative to a fixed instant. Deletion is by age only, so it
    /// can run alongside a collection cycle.
    pub async fn prune_at(&self, now: DateTime<Utc>, horizon: Duration) -> Result<u64> {
        let deleted = self.store.delete_older_than(now - horizon).await?;

        self.metrics.add_samples_pruned(deleted);
        self.logger.log_prune(deleted, horizon.num_hours());
        Ok(deleted)
    }
}
