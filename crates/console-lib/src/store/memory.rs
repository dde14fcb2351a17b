//! In-memory record and metrics store
//!
//! Backs the console when no external database is wired in, and every
//! test in the workspace. Records are seeded from a JSON inventory.

use super::{
    AppStore, ClusterStore, DeploymentVersionStore, EnvironmentStore, MembershipStore,
    MetricsStore,
};
use crate::error::{ConsoleError, Result};
use crate::models::{
    App, AppMember, Cluster, DeploymentVersion, Environment, MetricSample, MetricsQuery,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;

/// Reference records as loaded from disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub apps: Vec<App>,
    #[serde(default)]
    pub environments: Vec<Environment>,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
    #[serde(default)]
    pub versions: Vec<DeploymentVersion>,
    #[serde(default)]
    pub members: Vec<AppMember>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Inventory>,
    samples: RwLock<Vec<MetricSample>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inventory(inventory: Inventory) -> Self {
        Self {
            records: RwLock::new(inventory),
            samples: RwLock::new(Vec::new()),
        }
    }

    /// Load the inventory from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConsoleError::Store(format!("read {}: {}", path.display(), e)))?;
        let inventory: Inventory = serde_json::from_str(&content)
            .map_err(|e| ConsoleError::Store(format!("parse {}: {}", path.display(), e)))?;

        info!(
            path = %path.display(),
            apps = inventory.apps.len(),
            environments = inventory.environments.len(),
            clusters = inventory.clusters.len(),
            "Loaded inventory"
        );
        Ok(Self::with_inventory(inventory))
    }

    pub async fn insert_app(&self, app: App) {
        self.records.write().await.apps.push(app);
    }

    pub async fn insert_environment(&self, environment: Environment) {
        self.records.write().await.environments.push(environment);
    }

    pub async fn insert_cluster(&self, cluster: Cluster) {
        self.records.write().await.clusters.push(cluster);
    }

    pub async fn insert_version(&self, version: DeploymentVersion) {
        self.records.write().await.versions.push(version);
    }

    pub async fn insert_member(&self, member: AppMember) {
        self.records.write().await.members.push(member);
    }

    /// Snapshot of every stored sample
    pub async fn samples(&self) -> Vec<MetricSample> {
        self.samples.read().await.clone()
    }
}

#[async_trait]
impl AppStore for MemoryStore {
    async fn query_by_id(&self, id: &str) -> Result<Option<App>> {
        let records = self.records.read().await;
        Ok(records.apps.iter().find(|a| a.id == id).cloned())
    }

    async fn query_by_name(&self, name: &str) -> Result<Option<App>> {
        let records = self.records.read().await;
        Ok(records.apps.iter().find(|a| a.name == name).cloned())
    }

    async fn list(&self) -> Result<Vec<App>> {
        Ok(self.records.read().await.apps.clone())
    }
}

#[async_trait]
impl EnvironmentStore for MemoryStore {
    async fn query(&self, app_id: &str, env_id: &str) -> Result<Option<Environment>> {
        let records = self.records.read().await;
        Ok(records
            .environments
            .iter()
            .find(|e| e.app_id == app_id && e.id == env_id)
            .cloned())
    }

    async fn query_by_tag(&self, app_id: &str, tag: &str) -> Result<Option<Environment>> {
        let records = self.records.read().await;
        Ok(records
            .environments
            .iter()
            .find(|e| e.app_id == app_id && e.tag == tag)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Environment>> {
        Ok(self.records.read().await.environments.clone())
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn query_by_id(&self, id: &str) -> Result<Option<Cluster>> {
        let records = self.records.read().await;
        Ok(records.clusters.iter().find(|c| c.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Cluster>> {
        Ok(self.records.read().await.clusters.clone())
    }
}

#[async_trait]
impl DeploymentVersionStore for MemoryStore {
    async fn query_by_version_name(
        &self,
        version_name: &str,
    ) -> Result<Option<DeploymentVersion>> {
        let records = self.records.read().await;
        Ok(records
            .versions
            .iter()
            .find(|v| v.version_name == version_name)
            .cloned())
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn query(&self, app_id: &str, user_id: &str) -> Result<Option<AppMember>> {
        let records = self.records.read().await;
        Ok(records
            .members
            .iter()
            .find(|m| m.app_id == app_id && m.user_id == user_id)
            .cloned())
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn add_batch(&self, samples: Vec<MetricSample>) -> Result<usize> {
        let count = samples.len();
        self.samples.write().await.extend(samples);
        Ok(count)
    }

    async fn list(&self, query: &MetricsQuery) -> Result<Vec<MetricSample>> {
        let samples = self.samples.read().await;
        let mut matching: Vec<MetricSample> = samples
            .iter()
            .filter(|s| {
                s.replica_name == query.replica_name
                    && s.timestamp >= query.start_time
                    && s.timestamp <= query.end_time
            })
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.timestamp);
        Ok(matching)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut samples = self.samples.write().await;
        let before = samples.len();
        samples.retain(|s| s.timestamp >= cutoff);
        Ok((before - samples.len()) as u64)
    }
}
