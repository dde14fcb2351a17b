//! Replica metrics pipeline
//!
//! This module provides:
//! - Scheduled collection of live usage across all clusters
//! - Age-based retention of the persisted history
//! - Job scheduling with a per-job execution guard

mod collector;
mod retention;
mod scheduler;


pub use collector::{CollectionReport, CollectionSummary, MetricsCollector};
pub use retention::{Pruner, DEFAULT_HORIZON_HOURS};
pub use scheduler::{
    JobGuard, JobPermit, JobRun, JobScheduler, ReplicaJobs, SchedulerConfig,
    CLEAR_HISTORY_REPLICA_METRICS, COLLECT_REPLICA_METRICS,
};
