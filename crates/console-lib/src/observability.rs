//! Observability infrastructure for the replica console
//!
//! Provides:
//! - Prometheus metrics (collection latency, samples written/pruned, open streams)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for collection cycles (in seconds); a cycle fans out
/// to every cluster so it is much slower than a single request
const CYCLE_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ConsoleMetricsInner> = OnceLock::new();

struct ConsoleMetricsInner {
    collection_latency_seconds: Histogram,
    samples_written: IntCounter,
    snapshots_skipped: IntCounter,
    cluster_failures: IntCounter,
    samples_pruned: IntCounter,
    open_streams: IntGauge,
}

impl ConsoleMetricsInner {
    fn new() -> Self {
        Self {
            collection_latency_seconds: register_histogram!(
                "replica_console_collection_latency_seconds",
                "Time spent in one replica metrics collection cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_latency_seconds"),

            samples_written: register_int_counter!(
                "replica_console_samples_written_total",
                "Metric samples persisted by collection cycles"
            )
            .expect("Failed to register samples_written"),

            snapshots_skipped: register_int_counter!(
                "replica_console_snapshots_skipped_total",
                "Raw snapshots not attributable to a known environment"
            )
            .expect("Failed to register snapshots_skipped"),

            cluster_failures: register_int_counter!(
                "replica_console_cluster_failures_total",
                "Clusters abandoned during a collection cycle"
            )
            .expect("Failed to register cluster_failures"),

            samples_pruned: register_int_counter!(
                "replica_console_samples_pruned_total",
                "Metric samples deleted by retention"
            )
            .expect("Failed to register samples_pruned"),

            open_streams: register_int_gauge!(
                "replica_console_open_streams",
                "Log and file streams currently attached to a replica"
            )
            .expect("Failed to register open_streams"),
        }
    }
}

/// Console metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct ConsoleMetrics {
    _private: (),
}

impl Default for ConsoleMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ConsoleMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ConsoleMetricsInner {
        GLOBAL_METRICS.get_or_init(ConsoleMetricsInner::new)
    }

    pub fn observe_collection_latency(&self, duration_secs: f64) {
        self.inner().collection_latency_seconds.observe(duration_secs);
    }

    pub fn add_samples_written(&self, count: u64) {
        self.inner().samples_written.inc_by(count);
    }

    pub fn add_snapshots_skipped(&self, count: u64) {
        self.inner().snapshots_skipped.inc_by(count);
    }

    pub fn add_cluster_failures(&self, count: u64) {
        self.inner().cluster_failures.inc_by(count);
    }

    pub fn add_samples_pruned(&self, count: u64) {
        self.inner().samples_pruned.inc_by(count);
    }

    pub fn inc_open_streams(&self) {
        self.inner().open_streams.inc();
    }

    pub fn dec_open_streams(&self) {
        self.inner().open_streams.dec();
    }

    pub fn open_streams(&self) -> i64 {
        self.inner().open_streams.get()
    }
}

/// Structured logger for console events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, cluster_types: &[String]) {
        info!(
            event = "console_started",
            instance = %self.instance,
            console_version = %version,
            cluster_types = ?cluster_types,
            "Replica console started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "console_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Replica console shutting down"
        );
    }

    /// Log the outcome of one collection cycle
    pub fn log_collection(
        &self,
        samples_written: usize,
        snapshots_skipped: usize,
        clusters_failed: usize,
        elapsed_ms: u128,
    ) {
        if clusters_failed > 0 {
            warn!(
                event = "metrics_collected",
                instance = %self.instance,
                samples_written = samples_written,
                snapshots_skipped = snapshots_skipped,
                clusters_failed = clusters_failed,
                elapsed_ms = elapsed_ms,
                "Replica metrics collected with unreachable clusters"
            );
        } else {
            info!(
                event = "metrics_collected",
                instance = %self.instance,
                samples_written = samples_written,
                snapshots_skipped = snapshots_skipped,
                elapsed_ms = elapsed_ms,
                "Replica metrics collected"
            );
        }
    }

    pub fn log_prune(&self, deleted: u64, horizon_hours: i64) {
        info!(
            event = "metrics_pruned",
            instance = %self.instance,
            deleted = deleted,
            horizon_hours = horizon_hours,
            "Pruned replica metrics history"
        );
    }
}
