//! Background job scheduling
//!
//! Collection and retention run on independent timers. Each run, scheduled
//! or triggered by hand, first takes the job's guard so that two runs of
//! the same job never overlap.

use super::{CollectionSummary, MetricsCollector, Pruner};
use crate::error::Result;
use crate::health::{components, HealthRegistry};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const COLLECT_REPLICA_METRICS: &str = "collect-replica-metrics";
pub const CLEAR_HISTORY_REPLICA_METRICS: &str = "clear-history-replica-metrics";

/// Non-reentrant execution guard keyed by job name
#[derive(Debug, Clone, Default)]
pub struct JobGuard {
    running: Arc<DashMap<String, Instant>>,
}

impl JobGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `job` as running; `None` while another run holds it
    pub fn try_acquire(&self, job: &str) -> Option<JobPermit> {
        match self.running.entry(job.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Some(JobPermit {
                    running: self.running.clone(),
                    job: job.to_string(),
                })
            }
        }
    }

    pub fn is_running(&self, job: &str) -> bool {
        self.running.contains_key(job)
    }
}

/// Held for the duration of one job run
#[derive(Debug)]
pub struct JobPermit {
    running: Arc<DashMap<String, Instant>>,
    job: String,
}

impl Drop for JobPermit {
    fn drop(&mut self) {
        if let Some((_, since)) = self.running.remove(&self.job) {
            debug!(job = %self.job, elapsed_ms = since.elapsed().as_millis(), "Job finished");
        }
    }
}

/// Result of asking for a job run
#[derive(Debug)]
pub enum JobRun<T> {
    Completed(T),
    /// Another run of the same job was still in progress
    AlreadyRunning,
}

/// The two background jobs, guarded and reporting to health
#[derive(Clone)]
pub struct ReplicaJobs {
    collector: Arc<MetricsCollector>,
    pruner: Arc<Pruner>,
    guard: JobGuard,
    health: HealthRegistry,
}

impl ReplicaJobs {
    pub fn new(
        collector: Arc<MetricsCollector>,
        pruner: Arc<Pruner>,
        guard: JobGuard,
        health: HealthRegistry,
    ) -> Self {
        Self {
            collector,
            pruner,
            guard,
            health,
        }
    }

    pub fn guard(&self) -> &JobGuard {
        &self.guard
    }

    pub async fn collect_replica_metrics(&self) -> Result<JobRun<CollectionSummary>> {
        let Some(_permit) = self.guard.try_acquire(COLLECT_REPLICA_METRICS) else {
            return Ok(JobRun::AlreadyRunning);
        };

        match self.collector.collect_replica_metrics().await {
            Ok(summary) => {
                self.health
                    .report_run::<String>(components::COLLECTOR, Ok(&summary.failed_clusters))
                    .await;
                Ok(JobRun::Completed(summary))
            }
            Err(e) => {
                warn!(error = %e, "Replica metrics collection failed");
                self.health.report_run(components::COLLECTOR, Err(&e)).await;
                Err(e)
            }
        }
    }

    pub async fn clear_history_replica_metrics(&self) -> Result<JobRun<u64>> {
        let Some(_permit) = self.guard.try_acquire(CLEAR_HISTORY_REPLICA_METRICS) else {
            return Ok(JobRun::AlreadyRunning);
        };

        match self.pruner.clear_history_replica_metrics().await {
            Ok(deleted) => {
                self.health
                    .report_run::<String>(components::PRUNER, Ok(&[]))
                    .await;
                Ok(JobRun::Completed(deleted))
            }
            Err(e) => {
                warn!(error = %e, "Replica metrics pruning failed");
                self.health.report_run(components::PRUNER, Err(&e)).await;
                Err(e)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub collection_interval: Duration,
    pub retention_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            collection_interval: Duration::from_secs(60),
            retention_interval: Duration::from_secs(3600),
        }
    }
}

/// Runs the jobs on their timers until shutdown is broadcast
pub struct JobScheduler {
    jobs: ReplicaJobs,
    config: SchedulerConfig,
}

impl JobScheduler {
    pub fn new(jobs: ReplicaJobs, config: SchedulerConfig) -> Self {
        Self { jobs, config }
    }

    pub fn spawn(self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let collect = {
            let jobs = self.jobs.clone();
            let rx = shutdown.subscribe();
            tokio::spawn(run_every(
                COLLECT_REPLICA_METRICS,
                self.config.collection_interval,
                rx,
                move || {
                    let jobs = jobs.clone();
                    async move {
                        let run = jobs.collect_replica_metrics().await?;
                        Ok(matches!(run, JobRun::Completed(_)))
                    }
                },
            ))
        };

        let prune = {
            let jobs = self.jobs.clone();
            let rx = shutdown.subscribe();
            tokio::spawn(run_every(
                CLEAR_HISTORY_REPLICA_METRICS,
                self.config.retention_interval,
                rx,
                move || {
                    let jobs = jobs.clone();
                    async move {
                        let run = jobs.clear_history_replica_metrics().await?;
                        Ok(matches!(run, JobRun::Completed(_)))
                    }
                },
            ))
        };

        vec![collect, prune]
    }
}

/// Tick loop shared by both jobs; the run reports whether it actually executed
async fn run_every<F, Fut>(
    job: &'static str,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
    mut run: F,
) where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    info!(job = job, interval_secs = period.as_secs(), "Starting scheduled job");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run().await {
                    Ok(true) => {}
                    Ok(false) => debug!(job = job, "Previous run still in progress, skipping tick"),
                    // Already logged and reported by the job itself
                    Err(_) => {}
                }
            }
            _ = shutdown.recv() => {
                info!(job = job, "Shutting down scheduled job");
                break;
            }
        }
    }
}
