//! Core data models for the replica console

use crate::error::Result;
use crate::quantity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Application record, owned by the external app store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    /// Globally unique, used as the first naming-convention segment
    pub name: String,
}

/// Deployment target of one application, bound to one cluster and namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub app_id: String,
    /// Short tag, used as the second naming-convention segment
    pub tag: String,
    pub cluster_id: String,
    pub namespace: String,
    /// Declared CPU limit per replica as a quantity string (e.g. "2", "500m")
    pub cpu_limit: String,
    /// Declared memory limit per replica as a quantity string (e.g. "4Gi")
    pub memory_limit: String,
}

/// Registered cluster target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    /// Selects the backend implementation through the registry
    pub cluster_type: String,
    /// Technology-specific connection parameters, interpreted only by the backend
    #[serde(default)]
    pub connection: serde_json::Value,
}

/// Build output that produced a running version label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentVersion {
    pub id: String,
    pub app_id: String,
    pub version_name: String,
    pub branch_name: String,
}

/// Explicit membership of a user on an application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppMember {
    pub app_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Normal,
}

/// Authenticated caller as handed over by the web layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginIdentity {
    pub id: String,
    pub role: Role,
}

impl LoginIdentity {
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Admin,
        }
    }

    pub fn normal(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Normal,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Request for one page of replicas of an application environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRequest {
    pub app_id: String,
    #[serde(default)]
    pub environment_id: Option<String>,
    /// 1-based page number
    #[serde(default = "default_page_number")]
    pub page_number: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_number() -> usize {
    1
}

fn default_page_size() -> usize {
    10
}

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub page_number: usize,
    pub page_size: usize,
    pub page_count: usize,
    pub item_count: usize,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    /// Empty page, used whenever the caller may not see anything
    pub fn zero(page_number: usize, page_size: usize) -> Self {
        Self {
            page_number,
            page_size,
            page_count: 0,
            item_count: 0,
            items: Vec::new(),
        }
    }

    /// Cut one page out of an already ordered result set
    pub fn paginate(all: Vec<T>, page_number: usize, page_size: usize) -> Self {
        let page_number = page_number.max(1);
        let page_size = page_size.max(1);
        let item_count = all.len();
        let page_count = item_count.div_ceil(page_size);
        let items = all
            .into_iter()
            .skip(page_number.saturating_sub(1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        Self {
            page_number,
            page_size,
            page_count,
            item_count,
            items,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            page_number: self.page_number,
            page_size: self.page_size,
            page_count: self.page_count,
            item_count: self.item_count,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}

/// Scheduling domain inside a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

/// Lifecycle state of a running instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Terminating,
    Unknown,
}

impl ReplicaState {
    pub fn from_phase(phase: Option<&str>, deleting: bool) -> Self {
        if deleting {
            return ReplicaState::Terminating;
        }
        match phase {
            Some("Pending") => ReplicaState::Pending,
            Some("Running") => ReplicaState::Running,
            Some("Succeeded") => ReplicaState::Succeeded,
            Some("Failed") => ReplicaState::Failed,
            _ => ReplicaState::Unknown,
        }
    }
}

/// Current usage of one replica in common units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_nanocores: i64,
    pub memory_bytes: i64,
}

/// Live view of one running instance, never cached beyond one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaSnapshot {
    pub name: String,
    pub namespace: String,
    pub state: ReplicaState,
    pub started_at: Option<DateTime<Utc>>,
    pub ip: Option<String>,
    pub node: Option<String>,
    /// Version label stamped on the instance at deploy time
    pub version_name: Option<String>,
    pub usage: Option<ResourceUsage>,
}

/// Replica row returned to the web layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replica {
    #[serde(flatten)]
    pub snapshot: ReplicaSnapshot,
    pub app_id: String,
    pub environment_id: String,
    pub branch_name: Option<String>,
}

/// Usage of a single container, in backend-native quantity strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerUsage {
    pub name: String,
    pub cpu: String,
    pub memory: String,
}

/// Raw metric snapshot for one live instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMetricSnapshot {
    pub name: String,
    pub namespace: String,
    pub containers: Vec<ContainerUsage>,
}

impl RawMetricSnapshot {
    /// Usage of the primary (first) container in common units
    pub fn primary_usage(&self) -> Result<Option<ResourceUsage>> {
        let Some(container) = self.containers.first() else {
            return Ok(None);
        };
        Ok(Some(ResourceUsage {
            cpu_nanocores: quantity::cpu_nanocores(&container.cpu)?,
            memory_bytes: quantity::memory_bytes(&container.memory)?,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Values in nanocores
    Cpu,
    /// Values in bytes
    Memory,
}

/// Persisted usage sample; min and max carry the declared capacity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub app_id: String,
    pub replica_name: String,
    pub kind: MetricKind,
    pub current_value: i64,
    pub min_value: i64,
    pub max_value: i64,
    pub timestamp: DateTime<Utc>,
}

/// Time-window query over the samples of one replica
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsQuery {
    pub replica_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}
