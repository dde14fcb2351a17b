//! Record stores consumed by the console core
//!
//! Applications, environments, clusters, deployment versions and
//! memberships are owned by the surrounding CRUD layer; the core only
//! reads them. Metric samples are the one thing the core writes.

mod memory;

pub use memory::{Inventory, MemoryStore};

use crate::error::Result;
use crate::models::{
    App, AppMember, Cluster, DeploymentVersion, Environment, MetricSample, MetricsQuery,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait AppStore: Send + Sync {
    async fn query_by_id(&self, id: &str) -> Result<Option<App>>;

    async fn query_by_name(&self, name: &str) -> Result<Option<App>>;

    async fn list(&self) -> Result<Vec<App>>;
}

#[async_trait]
pub trait EnvironmentStore: Send + Sync {
    /// Environment `env_id` of application `app_id`
    async fn query(&self, app_id: &str, env_id: &str) -> Result<Option<Environment>>;

    /// Environment of application `app_id` carrying `tag`
    async fn query_by_tag(&self, app_id: &str, tag: &str) -> Result<Option<Environment>>;

    async fn list(&self) -> Result<Vec<Environment>>;
}

#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn query_by_id(&self, id: &str) -> Result<Option<Cluster>>;

    async fn list(&self) -> Result<Vec<Cluster>>;
}

#[async_trait]
pub trait DeploymentVersionStore: Send + Sync {
    async fn query_by_version_name(&self, version_name: &str)
        -> Result<Option<DeploymentVersion>>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn query(&self, app_id: &str, user_id: &str) -> Result<Option<AppMember>>;
}

/// Append-only time series of replica usage
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Append a batch of samples, returning how many were written
    async fn add_batch(&self, samples: Vec<MetricSample>) -> Result<usize>;

    /// Samples of one replica within `[start_time, end_time]`, oldest first
    async fn list(&self, query: &MetricsQuery) -> Result<Vec<MetricSample>>;

    /// Delete every sample strictly older than `cutoff`
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Handles to every read-only record store
#[derive(Clone)]
pub struct RecordStores {
    pub apps: Arc<dyn AppStore>,
    pub environments: Arc<dyn EnvironmentStore>,
    pub clusters: Arc<dyn ClusterStore>,
    pub versions: Arc<dyn DeploymentVersionStore>,
    pub members: Arc<dyn MembershipStore>,
}

impl RecordStores {
    /// Serve every record kind from one in-memory store
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            apps: store.clone(),
            environments: store.clone(),
            clusters: store.clone(),
            versions: store.clone(),
            members: store,
        }
    }
}
