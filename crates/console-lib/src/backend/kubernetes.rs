//! Kubernetes cluster backend
//!
//! Talks to the API server of a registered cluster with the credentials
//! stored on the cluster record:
//! - pods labelled with the workload name for replica listing
//! - pod deletion for rebuilds (the owning ReplicaSet recreates them)
//! - pod logs and exec for log and file inspection
//! - `metrics.k8s.io/v1beta1` PodMetrics for usage snapshots

use super::stream::{ByteStream, GuardedStream};
use super::{inspection_path, validate_file_name, ClusterBackend};
use crate::error::{ConsoleError, Result};
use crate::models::{
    App, Cluster, ContainerUsage, Environment, Namespace, Page, PageRequest, RawMetricSnapshot,
    ReplicaSnapshot, ReplicaState, ResourceUsage,
};
use crate::naming::NamingCodec;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace as K8sNamespace, Pod};
use kube::api::{Api, AttachParams, DeleteParams, ListParams, LogParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Client, Config};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tracing::{debug, warn};

/// Cluster-type tag of this backend
pub const KUBERNETES: &str = "kubernetes";

/// Pipe size between a followed log and its reader
const LOG_PIPE_BYTES: usize = 64 * 1024;

/// Backend-wide settings
#[derive(Debug, Clone)]
pub struct KubernetesConfig {
    /// TCP/TLS connection timeout
    pub connect_timeout: Duration,
    /// Upper bound for every request, including stream establishment
    pub request_timeout: Duration,
    /// Directory inside the replica exposed for listing and download
    pub inspection_dir: String,
    /// Lines returned by buffered log downloads and prepended to followed logs
    pub log_tail_lines: i64,
    /// Label carrying the workload name on every replica
    pub app_label: String,
    /// Label carrying the deployed version name
    pub version_label: String,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            inspection_dir: "/tmp/dhorse".to_string(),
            log_tail_lines: 1000,
            app_label: "app".to_string(),
            version_label: "version".to_string(),
        }
    }
}

/// Connection parameters stored on a Kubernetes cluster record
#[derive(Debug, Clone, Deserialize)]
pub struct KubernetesConnection {
    /// API server URL
    pub url: String,
    /// Service account bearer token
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl KubernetesConnection {
    pub fn from_cluster(cluster: &Cluster) -> Result<Self> {
        serde_json::from_value(cluster.connection.clone()).map_err(|e| {
            ConsoleError::backend_unavailable(
                &cluster.name,
                format!("invalid connection parameters: {e}"),
            )
        })
    }
}

/// PodMetrics container entry
#[derive(Debug, Deserialize)]
struct PodContainerMetrics {
    name: String,
    #[serde(default)]
    usage: BTreeMap<String, String>,
}

pub struct KubernetesBackend {
    config: KubernetesConfig,
}

impl KubernetesBackend {
    pub fn new(config: KubernetesConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KubernetesConfig {
        &self.config
    }

    /// Build a client for one cluster. Clients are not cached: cluster
    /// registrations may change between calls.
    ///
    /// Streaming clients get no read timeout, a followed log may stay
    /// quiet for longer than any request would.
    fn client(&self, cluster: &Cluster, streaming: bool) -> Result<Client> {
        let connection = KubernetesConnection::from_cluster(cluster)?;

        let mut config = Config::new(connection.url.parse().map_err(|e| {
            ConsoleError::backend_unavailable(&cluster.name, format!("invalid url: {e}"))
        })?);
        config.connect_timeout = Some(self.config.connect_timeout);
        config.read_timeout = if streaming {
            None
        } else {
            Some(self.config.request_timeout)
        };
        config.accept_invalid_certs = connection.accept_invalid_certs;
        if let Some(token) = connection.token {
            config.auth_info.token = Some(SecretString::new(token));
        }

        Client::try_from(config).map_err(|e| ConsoleError::backend_unavailable(&cluster.name, e))
    }

    fn pods(&self, cluster: &Cluster, namespace: &str, streaming: bool) -> Result<Api<Pod>> {
        Ok(Api::namespaced(self.client(cluster, streaming)?, namespace))
    }

    /// Bound a backend call by the request timeout
    async fn bounded<T>(
        &self,
        cluster: &Cluster,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    cluster = %cluster.name,
                    operation = operation,
                    timeout_secs = self.config.request_timeout.as_secs(),
                    "Cluster call timed out"
                );
                Err(ConsoleError::backend_unavailable(
                    &cluster.name,
                    format!("{operation} timed out"),
                ))
            }
        }
    }

    /// Fail with a typed not-found before starting exec sessions, whose
    /// upgrade errors do not carry the API status code
    async fn ensure_replica(&self, cluster: &Cluster, pods: &Api<Pod>, name: &str) -> Result<()> {
        pods.get(name)
            .await
            .map(|_| ())
            .map_err(|e| replica_error(cluster, name, e))
    }

    fn snapshot(&self, pod: Pod, namespace: &str) -> Option<ReplicaSnapshot> {
        let name = pod.metadata.name?;
        let deleting = pod.metadata.deletion_timestamp.is_some();
        let version_name = pod
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(&self.config.version_label).cloned());
        let node = pod.spec.and_then(|spec| spec.node_name);
        let status = pod.status.unwrap_or_default();

        Some(ReplicaSnapshot {
            name,
            namespace: namespace.to_string(),
            state: ReplicaState::from_phase(status.phase.as_deref(), deleting),
            started_at: status.start_time.map(|t| t.0),
            ip: status.pod_ip,
            node,
            version_name,
            usage: None,
        })
    }

    async fn exec_output(
        &self,
        cluster: &Cluster,
        pods: &Api<Pod>,
        replica_name: &str,
        command: Vec<String>,
    ) -> Result<String> {
        let mut process = pods
            .exec(replica_name, command, &AttachParams::default().stderr(false))
            .await
            .map_err(|e| replica_error(cluster, replica_name, e))?;

        let mut output = String::new();
        if let Some(mut stdout) = process.stdout() {
            stdout
                .read_to_string(&mut output)
                .await
                .map_err(|e| ConsoleError::backend_unavailable(&cluster.name, e))?;
        }
        Ok(output)
    }
}

impl Default for KubernetesBackend {
    fn default() -> Self {
        Self::new(KubernetesConfig::default())
    }
}

#[async_trait]
impl ClusterBackend for KubernetesBackend {
    fn cluster_type(&self) -> &str {
        KUBERNETES
    }

    async fn list_namespaces(
        &self,
        cluster: &Cluster,
        filter: Option<&str>,
    ) -> Result<Vec<Namespace>> {
        let api: Api<K8sNamespace> = Api::all(self.client(cluster, false)?);
        let list = self
            .bounded(cluster, "list namespaces", async {
                api.list(&ListParams::default())
                    .await
                    .map_err(|e| ConsoleError::backend_unavailable(&cluster.name, e))
            })
            .await?;

        let mut namespaces: Vec<Namespace> = list
            .items
            .into_iter()
            .filter_map(|ns| {
                let name = ns.metadata.name?;
                if let Some(filter) = filter {
                    if !name.contains(filter) {
                        return None;
                    }
                }
                Some(Namespace {
                    name,
                    phase: ns.status.and_then(|s| s.phase),
                })
            })
            .collect();
        namespaces.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(cluster = %cluster.name, count = namespaces.len(), "Listed namespaces");
        Ok(namespaces)
    }

    async fn page_replicas(
        &self,
        cluster: &Cluster,
        app: &App,
        environment: &Environment,
        page: &PageRequest,
    ) -> Result<Page<ReplicaSnapshot>> {
        let workload = NamingCodec::encode(&app.name, &environment.tag)?;
        let selector = format!("{}={}", self.config.app_label, workload);
        let pods = self.pods(cluster, &environment.namespace, false)?;

        let list = self
            .bounded(cluster, "list replicas", async {
                pods.list(&ListParams::default().labels(&selector))
                    .await
                    .map_err(|e| ConsoleError::backend_unavailable(&cluster.name, e))
            })
            .await?;

        let mut snapshots: Vec<ReplicaSnapshot> = list
            .items
            .into_iter()
            .filter_map(|pod| self.snapshot(pod, &environment.namespace))
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));

        let mut page = Page::paginate(snapshots, page.page_number, page.page_size);
        if page.items.is_empty() {
            return Ok(page);
        }

        // Usage is best effort: clusters without metrics-server still list replicas
        match self.fetch_metrics(cluster, &environment.namespace).await {
            Ok(raw) => {
                let usage: HashMap<String, ResourceUsage> = raw
                    .iter()
                    .filter_map(|s| match s.primary_usage() {
                        Ok(Some(usage)) => Some((s.name.clone(), usage)),
                        _ => None,
                    })
                    .collect();
                for item in &mut page.items {
                    item.usage = usage.get(&item.name).copied();
                }
            }
            Err(e) => {
                debug!(cluster = %cluster.name, error = %e, "Replica usage unavailable");
            }
        }

        Ok(page)
    }

    async fn rebuild_replica(
        &self,
        cluster: &Cluster,
        replica_name: &str,
        namespace: &str,
    ) -> Result<()> {
        let pods = self.pods(cluster, namespace, false)?;
        self.bounded(cluster, "rebuild replica", async {
            pods.delete(replica_name, &DeleteParams::default())
                .await
                .map(|_| ())
                .map_err(|e| replica_error(cluster, replica_name, e))
        })
        .await?;

        debug!(cluster = %cluster.name, namespace = %namespace, replica = %replica_name, "Requested replica rebuild");
        Ok(())
    }

    async fn stream_log(
        &self,
        cluster: &Cluster,
        replica_name: &str,
        namespace: &str,
    ) -> Result<ByteStream> {
        let pods = self.pods(cluster, namespace, true)?;
        let params = LogParams {
            follow: true,
            tail_lines: Some(self.config.log_tail_lines),
            ..LogParams::default()
        };

        // The pump task owns the API handle and the followed log; the reader
        // half of the pipe is what the caller consumes.
        let (mut writer, reader) = tokio::io::duplex(LOG_PIPE_BYTES);
        let (opened_tx, opened_rx) = oneshot::channel::<std::result::Result<(), kube::Error>>();
        let name = replica_name.to_string();
        let pump = tokio::spawn(async move {
            let log = match pods.log_stream(&name, &params).await {
                Ok(log) => {
                    let _ = opened_tx.send(Ok(()));
                    log
                }
                Err(e) => {
                    let _ = opened_tx.send(Err(e));
                    return;
                }
            };
            let mut log = Box::pin(log.compat());
            if let Err(e) = tokio::io::copy(&mut log, &mut writer).await {
                debug!(replica = %name, error = %e, "Log stream closed");
            }
        });

        let opened = self
            .bounded(cluster, "stream log", async {
                match opened_rx.await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(replica_error(cluster, replica_name, e)),
                    Err(_) => Err(ConsoleError::backend_unavailable(
                        &cluster.name,
                        "log stream task ended before opening",
                    )),
                }
            })
            .await;
        if let Err(e) = opened {
            pump.abort();
            return Err(e);
        }

        Ok(
            GuardedStream::new(reader, format!("log/{namespace}/{replica_name}"))
                .on_release(move || pump.abort())
                .into_byte_stream(),
        )
    }

    async fn list_files(
        &self,
        cluster: &Cluster,
        replica_name: &str,
        namespace: &str,
    ) -> Result<Vec<String>> {
        let pods = self.pods(cluster, namespace, false)?;
        let dir = self.config.inspection_dir.trim_end_matches('/').to_string();
        let command = vec![
            "find".to_string(),
            dir.clone(),
            "-type".to_string(),
            "f".to_string(),
        ];

        let output = self
            .bounded(cluster, "list files", async {
                self.ensure_replica(cluster, &pods, replica_name).await?;
                self.exec_output(cluster, &pods, replica_name, command).await
            })
            .await?;

        let prefix = format!("{dir}/");
        let mut files: Vec<String> = output
            .lines()
            .filter_map(|line| line.trim().strip_prefix(&prefix))
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        files.sort();
        Ok(files)
    }

    async fn download_file(
        &self,
        cluster: &Cluster,
        namespace: &str,
        replica_name: &str,
        file_name: &str,
    ) -> Result<ByteStream> {
        let file_name = validate_file_name(file_name)?;
        let path = inspection_path(&self.config.inspection_dir, file_name)?;

        let files = self.list_files(cluster, replica_name, namespace).await?;
        if !files.iter().any(|f| f == file_name) {
            return Err(ConsoleError::FileNotFound(file_name.to_string()));
        }

        let pods = self.pods(cluster, namespace, true)?;
        let mut process = self
            .bounded(cluster, "download file", async {
                pods.exec(
                    replica_name,
                    vec!["cat".to_string(), path.clone()],
                    &AttachParams::default().stderr(false),
                )
                .await
                .map_err(|e| replica_error(cluster, replica_name, e))
            })
            .await?;

        let stdout = process.stdout().ok_or_else(|| {
            ConsoleError::backend_unavailable(&cluster.name, "exec session has no stdout")
        })?;

        Ok(GuardedStream::new(stdout, format!("file/{namespace}/{replica_name}/{file_name}"))
            .on_release(move || process.abort())
            .into_byte_stream())
    }

    async fn fetch_log(
        &self,
        cluster: &Cluster,
        replica_name: &str,
        namespace: &str,
    ) -> Result<String> {
        let pods = self.pods(cluster, namespace, false)?;
        let params = LogParams {
            tail_lines: Some(self.config.log_tail_lines),
            ..LogParams::default()
        };

        self.bounded(cluster, "fetch log", async {
            pods.logs(replica_name, &params)
                .await
                .map_err(|e| replica_error(cluster, replica_name, e))
        })
        .await
    }

    async fn fetch_metrics(
        &self,
        cluster: &Cluster,
        namespace: &str,
    ) -> Result<Vec<RawMetricSnapshot>> {
        let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "PodMetrics");
        let resource = ApiResource::from_gvk_with_plural(&gvk, "pods");
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client(cluster, false)?, namespace, &resource);

        let list = self
            .bounded(cluster, "fetch metrics", async {
                api.list(&ListParams::default())
                    .await
                    .map_err(|e| ConsoleError::backend_unavailable(&cluster.name, e))
            })
            .await?;

        let snapshots = list
            .items
            .into_iter()
            .filter_map(|object| {
                let name = object.metadata.name?;
                let containers: Vec<PodContainerMetrics> = object
                    .data
                    .get("containers")
                    .cloned()
                    .and_then(|value| serde_json::from_value(value).ok())
                    .unwrap_or_default();

                Some(RawMetricSnapshot {
                    name,
                    namespace: namespace.to_string(),
                    containers: containers
                        .into_iter()
                        .map(|c| ContainerUsage {
                            cpu: c.usage.get("cpu").cloned().unwrap_or_else(|| "0".into()),
                            memory: c.usage.get("memory").cloned().unwrap_or_else(|| "0".into()),
                            name: c.name,
                        })
                        .collect(),
                })
            })
            .collect();

        Ok(snapshots)
    }
}

/// Map a kube error on a named replica to the typed taxonomy
fn replica_error(cluster: &Cluster, replica_name: &str, err: kube::Error) -> ConsoleError {
    match err {
        kube::Error::Api(response) if response.code == 404 => {
            ConsoleError::ReplicaNotFound(replica_name.to_string())
        }
        other => ConsoleError::backend_unavailable(&cluster.name, other),
    }
}
