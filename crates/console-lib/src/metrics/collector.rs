//! Replica metrics collection
//!
//! One cycle walks every registered cluster, fetches raw usage for each
//! namespace, attributes snapshots to environments by name prefix and
//! writes the resulting samples as a single batch.

use crate::backend::BackendRegistry;
use crate::error::{ConsoleError, Result};
use crate::models::{App, Environment, MetricKind, MetricSample, RawMetricSnapshot};
use crate::naming::NamingCodec;
use crate::observability::{ConsoleMetrics, StructuredLogger};
use crate::quantity;
use crate::store::{MetricsStore, RecordStores};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Everything one cycle gathered, before it is written
#[derive(Debug, Default)]
pub struct CollectionReport {
    pub samples: Vec<MetricSample>,
    /// Snapshots attributed to an environment
    pub matched: usize,
    /// Snapshots not belonging to any known environment
    pub unmatched: usize,
    /// Snapshots dropped because a quantity could not be parsed
    pub invalid: usize,
    /// Clusters abandoned for this cycle
    pub failed_clusters: Vec<String>,
}

/// Outcome of a completed cycle
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub started_at: DateTime<Utc>,
    pub samples_written: usize,
    pub snapshots_unmatched: usize,
    pub snapshots_invalid: usize,
    pub failed_clusters: Vec<String>,
    pub elapsed_ms: u64,
}

pub struct MetricsCollector {
    stores: RecordStores,
    samples: Arc<dyn MetricsStore>,
    registry: BackendRegistry,
    metrics: ConsoleMetrics,
    logger: StructuredLogger,
}

impl MetricsCollector {
    pub fn new(
        stores: RecordStores,
        samples: Arc<dyn MetricsStore>,
        registry: BackendRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            stores,
            samples,
            registry,
            metrics: ConsoleMetrics::new(),
            logger,
        }
    }

    /// Run one full cycle and persist its samples
    pub async fn collect_replica_metrics(&self) -> Result<CollectionSummary> {
        let started = Instant::now();
        let started_at = Utc::now();

        let report = self.cycle(started_at).await?;
        let samples_written = if report.samples.is_empty() {
            0
        } else {
            self.samples.add_batch(report.samples).await?
        };

        let elapsed = started.elapsed();
        self.metrics.observe_collection_latency(elapsed.as_secs_f64());
        self.metrics.add_samples_written(samples_written as u64);
        self.metrics
            .add_snapshots_skipped((report.unmatched + report.invalid) as u64);
        self.metrics
            .add_cluster_failures(report.failed_clusters.len() as u64);
        self.logger.log_collection(
            samples_written,
            report.unmatched + report.invalid,
            report.failed_clusters.len(),
            elapsed.as_millis(),
        );

        Ok(CollectionSummary {
            started_at,
            samples_written,
            snapshots_unmatched: report.unmatched,
            snapshots_invalid: report.invalid,
            failed_clusters: report.failed_clusters,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }

    /// Gather samples from every cluster, all stamped with `started_at`.
    ///
    /// Only record store failures abort the cycle; cluster and snapshot
    /// failures are counted in the report.
    pub async fn cycle(&self, started_at: DateTime<Utc>) -> Result<CollectionReport> {
        let mut report = CollectionReport::default();

        let clusters = self.stores.clusters.list().await?;
        if clusters.is_empty() {
            debug!("No clusters registered, nothing to collect");
            return Ok(report);
        }
        let environments = self.stores.environments.list().await?;
        let apps = self.stores.apps.list().await?;
        if environments.is_empty() || apps.is_empty() {
            debug!("No applications or environments, nothing to collect");
            return Ok(report);
        }

        let targets = correlation_map(&apps, environments);

        for cluster in &clusters {
            let backend = match self.registry.resolve(&cluster.cluster_type) {
                Ok(backend) => backend,
                Err(e) => {
                    warn!(cluster = %cluster.name, error = %e, "Skipping cluster");
                    report.failed_clusters.push(cluster.name.clone());
                    continue;
                }
            };

            let namespaces = match backend.list_namespaces(cluster, None).await {
                Ok(namespaces) => namespaces,
                Err(e) => {
                    warn!(cluster = %cluster.name, error = %e, "Cannot list namespaces, abandoning cluster for this cycle");
                    report.failed_clusters.push(cluster.name.clone());
                    continue;
                }
            };

            for namespace in &namespaces {
                match backend.fetch_metrics(cluster, &namespace.name).await {
                    Ok(snapshots) => {
                        for snapshot in &snapshots {
                            attribute(snapshot, &targets, started_at, &mut report);
                        }
                    }
                    Err(e @ ConsoleError::BackendUnavailable { .. }) => {
                        warn!(cluster = %cluster.name, namespace = %namespace.name, error = %e, "Cluster unavailable, abandoning it for this cycle");
                        report.failed_clusters.push(cluster.name.clone());
                        break;
                    }
                    Err(e) => {
                        debug!(cluster = %cluster.name, namespace = %namespace.name, error = %e, "No metrics for namespace");
                    }
                }
            }
        }

        if report.unmatched > 0 {
            debug!(
                unmatched = report.unmatched,
                "Snapshots without a known environment"
            );
        }
        Ok(report)
    }
}

/// Workload name prefix of every environment, mapped to the environment
fn correlation_map(
    apps: &[App],
    environments: Vec<Environment>,
) -> HashMap<String, Environment> {
    let names: HashMap<&str, &str> = apps
        .iter()
        .map(|a| (a.id.as_str(), a.name.as_str()))
        .collect();

    let mut targets = HashMap::with_capacity(environments.len());
    for env in environments {
        let Some(app_name) = names.get(env.app_id.as_str()) else {
            debug!(environment = %env.id, app_id = %env.app_id, "Environment of unknown application");
            continue;
        };
        match NamingCodec::encode(app_name, &env.tag) {
            Ok(key) => {
                targets.insert(key, env);
            }
            Err(e) => {
                warn!(environment = %env.id, error = %e, "Environment cannot be correlated");
            }
        }
    }
    targets
}

fn attribute(
    snapshot: &RawMetricSnapshot,
    targets: &HashMap<String, Environment>,
    timestamp: DateTime<Utc>,
    report: &mut CollectionReport,
) {
    let Some(env) = NamingCodec::correlation_key(&snapshot.name).and_then(|key| targets.get(key))
    else {
        report.unmatched += 1;
        return;
    };

    match samples_for(snapshot, env, timestamp) {
        Ok(Some([cpu, memory])) => {
            report.matched += 1;
            report.samples.push(cpu);
            report.samples.push(memory);
        }
        Ok(None) => {
            debug!(replica = %snapshot.name, "Snapshot without containers");
            report.invalid += 1;
        }
        Err(e) => {
            warn!(replica = %snapshot.name, error = %e, "Skipping snapshot");
            report.invalid += 1;
        }
    }
}

/// CPU and memory samples of one replica, bounded by the environment limits
fn samples_for(
    snapshot: &RawMetricSnapshot,
    env: &Environment,
    timestamp: DateTime<Utc>,
) -> Result<Option<[MetricSample; 2]>> {
    let Some(usage) = snapshot.primary_usage()? else {
        return Ok(None);
    };
    let cpu_limit = quantity::cpu_nanocores(&env.cpu_limit)?;
    let memory_limit = quantity::memory_bytes(&env.memory_limit)?;

    let sample = |kind, current_value, limit| MetricSample {
        app_id: env.app_id.clone(),
        replica_name: snapshot.name.clone(),
        kind,
        current_value,
        min_value: limit,
        max_value: limit,
        timestamp,
    };

    Ok(Some([
        sample(MetricKind::Cpu, usage.cpu_nanocores, cpu_limit),
        sample(MetricKind::Memory, usage.memory_bytes, memory_limit),
    ]))
}
