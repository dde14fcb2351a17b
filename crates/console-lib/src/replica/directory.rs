use crate::backend::{BackendRegistry, ClusterBackend};
use crate::error::{ConsoleError, Result};
use crate::models::{
    App, Cluster, DeploymentVersion, Environment, LoginIdentity, Page, PageRequest, Replica,
};
use crate::naming::NamingCodec;
use crate::store::RecordStores;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Records a replica name resolves to
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaContext {
    pub app: App,
    pub environment: Environment,
    pub cluster: Cluster,
}

pub struct ReplicaDirectory {
    stores: RecordStores,
    registry: BackendRegistry,
}

impl ReplicaDirectory {
    pub fn new(stores: RecordStores, registry: BackendRegistry) -> Self {
        Self { stores, registry }
    }

    pub fn stores(&self) -> &RecordStores {
        &self.stores
    }

    /// Backend serving a resolved cluster
    pub fn backend(&self, cluster: &Cluster) -> Result<Arc<dyn ClusterBackend>> {
        self.registry.resolve(&cluster.cluster_type)
    }

    /// Admins see every application, everyone else needs a membership record
    pub async fn has_rights(&self, login: &LoginIdentity, app_id: &str) -> Result<bool> {
        if login.is_admin() {
            return Ok(true);
        }
        Ok(self.stores.members.query(app_id, &login.id).await?.is_some())
    }

    /// One page of live replicas of an application environment.
    ///
    /// Anything the caller may not see, or that does not exist, yields an
    /// empty page rather than an error.
    pub async fn page(&self, login: &LoginIdentity, request: &PageRequest) -> Result<Page<Replica>> {
        let zero = || Page::zero(request.page_number, request.page_size);

        let Some(env_id) = request.environment_id.as_deref() else {
            return Ok(zero());
        };
        if !self.has_rights(login, &request.app_id).await? {
            debug!(user_id = %login.id, app_id = %request.app_id, "No rights on application, empty replica page");
            return Ok(zero());
        }
        let Some(environment) = self.stores.environments.query(&request.app_id, env_id).await?
        else {
            return Ok(zero());
        };
        let Some(app) = self.stores.apps.query_by_id(&request.app_id).await? else {
            return Ok(zero());
        };
        let cluster = self.cluster(&environment.cluster_id).await?;

        let snapshots = self
            .backend(&cluster)?
            .page_replicas(&cluster, &app, &environment, request)
            .await?;

        // Version lookups are cached per page, misses included
        let mut versions: HashMap<String, Option<DeploymentVersion>> = HashMap::new();
        let mut rows = Vec::with_capacity(snapshots.items.len());
        let Page {
            page_number,
            page_size,
            page_count,
            item_count,
            items,
        } = snapshots;

        for snapshot in items {
            let branch_name = match snapshot.version_name.as_deref() {
                Some(version_name) => {
                    if !versions.contains_key(version_name) {
                        let version = self
                            .stores
                            .versions
                            .query_by_version_name(version_name)
                            .await?;
                        versions.insert(version_name.to_string(), version);
                    }
                    versions
                        .get(version_name)
                        .and_then(|v| v.as_ref())
                        .map(|v| v.branch_name.clone())
                }
                None => None,
            };
            rows.push(Replica {
                snapshot,
                app_id: app.id.clone(),
                environment_id: environment.id.clone(),
                branch_name,
            });
        }

        Ok(Page {
            page_number,
            page_size,
            page_count,
            item_count,
            items: rows,
        })
    }

    /// Resolve a replica name to its application, environment and cluster
    pub async fn resolve(&self, replica_name: &str, login: &LoginIdentity) -> Result<ReplicaContext> {
        let replica_name = replica_name.trim();
        if replica_name.is_empty() {
            return Err(ConsoleError::RequiredField("replica_name"));
        }

        let (app_name, tag) = NamingCodec::decode(replica_name)?;
        let app = self
            .stores
            .apps
            .query_by_name(&app_name)
            .await?
            .ok_or_else(|| ConsoleError::ReplicaNameInvalid(replica_name.to_string()))?;

        if !self.has_rights(login, &app.id).await? {
            return Err(ConsoleError::Rights {
                user_id: login.id.clone(),
                app_id: app.id,
            });
        }

        let environment = self
            .stores
            .environments
            .query_by_tag(&app.id, &tag)
            .await?
            .filter(|env| env.tag == tag)
            .ok_or_else(|| ConsoleError::ReplicaNameInvalid(replica_name.to_string()))?;

        let cluster = self.cluster(&environment.cluster_id).await?;

        Ok(ReplicaContext {
            app,
            environment,
            cluster,
        })
    }

    async fn cluster(&self, cluster_id: &str) -> Result<Cluster> {
        self.stores
            .clusters
            .query_by_id(cluster_id)
            .await?
            .ok_or_else(|| ConsoleError::ClusterNotFound(cluster_id.to_string()))
    }
}
