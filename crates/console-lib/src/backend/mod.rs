//! Cluster backends
//!
//! One [`ClusterBackend`] implementation exists per supported cluster
//! technology. Callers obtain an instance through the [`BackendRegistry`]
//! and never branch on the technology themselves.

mod kubernetes;
mod registry;
mod stream;

pub use kubernetes::{KubernetesBackend, KubernetesConfig, KubernetesConnection, KUBERNETES};
pub use registry::{BackendRegistry, BackendRegistryBuilder};
pub use stream::{ByteStream, GuardedStream};

use crate::error::{ConsoleError, Result};
use crate::models::{
    App, Cluster, Environment, Namespace, Page, PageRequest, RawMetricSnapshot, ReplicaSnapshot,
};
use std::path::{Component, Path};

pub use async_trait::async_trait;

/// Live operations against one kind of cluster
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Cluster-type tag this backend is registered under
    fn cluster_type(&self) -> &str;

    /// Enumerate namespaces, optionally keeping only names containing `filter`
    async fn list_namespaces(
        &self,
        cluster: &Cluster,
        filter: Option<&str>,
    ) -> Result<Vec<Namespace>>;

    /// One page of the live replicas of an application environment,
    /// ordered by replica name
    async fn page_replicas(
        &self,
        cluster: &Cluster,
        app: &App,
        environment: &Environment,
        page: &PageRequest,
    ) -> Result<Page<ReplicaSnapshot>>;

    /// Request recreation of one replica; does not wait for readiness
    async fn rebuild_replica(
        &self,
        cluster: &Cluster,
        replica_name: &str,
        namespace: &str,
    ) -> Result<()>;

    /// Follow the replica log; the stream releases its connection on drop
    async fn stream_log(
        &self,
        cluster: &Cluster,
        replica_name: &str,
        namespace: &str,
    ) -> Result<ByteStream>;

    /// File names inside the inspection directory of the replica
    async fn list_files(
        &self,
        cluster: &Cluster,
        replica_name: &str,
        namespace: &str,
    ) -> Result<Vec<String>>;

    /// Content of one file of the inspection directory
    async fn download_file(
        &self,
        cluster: &Cluster,
        namespace: &str,
        replica_name: &str,
        file_name: &str,
    ) -> Result<ByteStream>;

    /// Bounded tail of the replica log
    async fn fetch_log(
        &self,
        cluster: &Cluster,
        replica_name: &str,
        namespace: &str,
    ) -> Result<String>;

    /// Raw usage of every live instance in a namespace
    async fn fetch_metrics(
        &self,
        cluster: &Cluster,
        namespace: &str,
    ) -> Result<Vec<RawMetricSnapshot>>;
}

/// Reject file names that could leave the inspection directory.
///
/// Only plain relative names made of normal components are accepted.
pub fn validate_file_name(file_name: &str) -> Result<&str> {
    let trimmed = file_name.trim();
    if trimmed.is_empty() {
        return Err(ConsoleError::RequiredField("file_name"));
    }
    if trimmed.contains('\0') || trimmed.contains('\\') {
        return Err(ConsoleError::PathTraversal(file_name.to_string()));
    }

    let escapes = Path::new(trimmed)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(ConsoleError::PathTraversal(file_name.to_string()));
    }

    Ok(trimmed)
}

/// Absolute path of a validated file inside the inspection directory
pub fn inspection_path(inspection_dir: &str, file_name: &str) -> Result<String> {
    let file_name = validate_file_name(file_name)?;
    Ok(format!("{}/{}", inspection_dir.trim_end_matches('/'), file_name))
}
