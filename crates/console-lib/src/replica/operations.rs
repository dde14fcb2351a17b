use super::{ReplicaContext, ReplicaDirectory};
use crate::backend::{validate_file_name, ByteStream, ClusterBackend};
use crate::error::Result;
use crate::models::{LoginIdentity, MetricSample, MetricsQuery};
use crate::store::MetricsStore;
use std::sync::Arc;
use tracing::info;

/// Live operations on a single replica. Every call resolves the replica
/// name first; nothing reaches a backend unless resolution succeeded.
#[derive(Clone)]
pub struct ReplicaOperations {
    directory: Arc<ReplicaDirectory>,
    metrics: Arc<dyn MetricsStore>,
}

impl ReplicaOperations {
    pub fn new(directory: Arc<ReplicaDirectory>, metrics: Arc<dyn MetricsStore>) -> Self {
        Self { directory, metrics }
    }

    async fn target(
        &self,
        login: &LoginIdentity,
        replica_name: &str,
    ) -> Result<(ReplicaContext, Arc<dyn ClusterBackend>)> {
        let context = self.directory.resolve(replica_name, login).await?;
        let backend = self.directory.backend(&context.cluster)?;
        Ok((context, backend))
    }

    pub async fn rebuild(&self, login: &LoginIdentity, replica_name: &str) -> Result<()> {
        let (ctx, backend) = self.target(login, replica_name).await?;
        backend
            .rebuild_replica(&ctx.cluster, replica_name.trim(), &ctx.environment.namespace)
            .await?;

        info!(
            user_id = %login.id,
            replica = %replica_name.trim(),
            cluster = %ctx.cluster.name,
            "Replica rebuild requested"
        );
        Ok(())
    }

    pub async fn stream_log(&self, login: &LoginIdentity, replica_name: &str) -> Result<ByteStream> {
        let (ctx, backend) = self.target(login, replica_name).await?;
        backend
            .stream_log(&ctx.cluster, replica_name.trim(), &ctx.environment.namespace)
            .await
    }

    pub async fn query_files(&self, login: &LoginIdentity, replica_name: &str) -> Result<Vec<String>> {
        let (ctx, backend) = self.target(login, replica_name).await?;
        backend
            .list_files(&ctx.cluster, replica_name.trim(), &ctx.environment.namespace)
            .await
    }

    pub async fn download_file(
        &self,
        login: &LoginIdentity,
        replica_name: &str,
        file_name: &str,
    ) -> Result<ByteStream> {
        let file_name = validate_file_name(file_name)?;
        let (ctx, backend) = self.target(login, replica_name).await?;
        backend
            .download_file(
                &ctx.cluster,
                &ctx.environment.namespace,
                replica_name.trim(),
                file_name,
            )
            .await
    }

    pub async fn download_log(&self, login: &LoginIdentity, replica_name: &str) -> Result<String> {
        let (ctx, backend) = self.target(login, replica_name).await?;
        backend
            .fetch_log(&ctx.cluster, replica_name.trim(), &ctx.environment.namespace)
            .await
    }

    /// Persisted samples of one replica in `[start_time, end_time]`
    pub async fn replica_metrics_list(
        &self,
        login: &LoginIdentity,
        query: &MetricsQuery,
    ) -> Result<Vec<MetricSample>> {
        self.directory.resolve(&query.replica_name, login).await?;
        let query = MetricsQuery {
            replica_name: query.replica_name.trim().to_string(),
            ..query.clone()
        };
        self.metrics.list(&query).await
    }
}
