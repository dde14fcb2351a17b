//! In-memory cluster backend and fixtures shared by unit tests

use crate::backend::{ByteStream, ClusterBackend, GuardedStream};
use crate::error::{ConsoleError, Result};
use crate::models::{
    App, AppMember, Cluster, ContainerUsage, DeploymentVersion, Environment, Namespace, Page,
    PageRequest, RawMetricSnapshot, ReplicaSnapshot, ReplicaState,
};
use crate::naming::NamingCodec;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scriptable backend: every call is counted, state is plain data
pub struct FakeBackend {
    cluster_type: String,
    namespaces: Vec<String>,
    metrics: HashMap<String, Vec<RawMetricSnapshot>>,
    replicas: Vec<ReplicaSnapshot>,
    files: HashMap<String, Vec<u8>>,
    log: String,
    unavailable: bool,
    calls: AtomicUsize,
    rebuilt: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new(cluster_type: &str) -> Self {
        Self {
            cluster_type: cluster_type.to_string(),
            namespaces: Vec::new(),
            metrics: HashMap::new(),
            replicas: Vec::new(),
            files: HashMap::new(),
            log: String::new(),
            unavailable: false,
            calls: AtomicUsize::new(0),
            rebuilt: Mutex::new(Vec::new()),
        }
    }

    pub fn with_metrics(mut self, namespace: &str, snapshots: Vec<RawMetricSnapshot>) -> Self {
        if !self.namespaces.iter().any(|n| n == namespace) {
            self.namespaces.push(namespace.to_string());
        }
        self.metrics
            .entry(namespace.to_string())
            .or_default()
            .extend(snapshots);
        self
    }

    pub fn with_replica(mut self, replica: ReplicaSnapshot) -> Self {
        self.replicas.push(replica);
        self
    }

    pub fn with_file(mut self, name: &str, content: &[u8]) -> Self {
        self.files.insert(name.to_string(), content.to_vec());
        self
    }

    pub fn with_log(mut self, log: &str) -> Self {
        self.log = log.to_string();
        self
    }

    /// Every call fails as if the cluster were unreachable
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn rebuilt(&self) -> Vec<String> {
        self.rebuilt.lock().unwrap().clone()
    }

    fn enter(&self, cluster: &Cluster) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(ConsoleError::backend_unavailable(
                &cluster.name,
                "connection refused",
            ));
        }
        Ok(())
    }

    fn find_replica(&self, name: &str, namespace: &str) -> Result<&ReplicaSnapshot> {
        self.replicas
            .iter()
            .find(|r| r.name == name && r.namespace == namespace)
            .ok_or_else(|| ConsoleError::ReplicaNotFound(name.to_string()))
    }
}

#[async_trait]
impl ClusterBackend for FakeBackend {
    fn cluster_type(&self) -> &str {
        &self.cluster_type
    }

    async fn list_namespaces(
        &self,
        cluster: &Cluster,
        filter: Option<&str>,
    ) -> Result<Vec<Namespace>> {
        self.enter(cluster)?;
        Ok(self
            .namespaces
            .iter()
            .filter(|n| filter.map_or(true, |f| n.contains(f)))
            .map(|n| Namespace {
                name: n.clone(),
                phase: Some("Active".to_string()),
            })
            .collect())
    }

    async fn page_replicas(
        &self,
        cluster: &Cluster,
        app: &App,
        environment: &Environment,
        page: &PageRequest,
    ) -> Result<Page<ReplicaSnapshot>> {
        self.enter(cluster)?;
        let workload = NamingCodec::encode(&app.name, &environment.tag)?;
        let mut rows: Vec<ReplicaSnapshot> = self
            .replicas
            .iter()
            .filter(|r| r.namespace == environment.namespace && r.name.starts_with(&workload))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Page::paginate(rows, page.page_number, page.page_size))
    }

    async fn rebuild_replica(
        &self,
        cluster: &Cluster,
        replica_name: &str,
        namespace: &str,
    ) -> Result<()> {
        self.enter(cluster)?;
        self.find_replica(replica_name, namespace)?;
        self.rebuilt.lock().unwrap().push(replica_name.to_string());
        Ok(())
    }

    async fn stream_log(
        &self,
        cluster: &Cluster,
        replica_name: &str,
        namespace: &str,
    ) -> Result<ByteStream> {
        self.enter(cluster)?;
        self.find_replica(replica_name, namespace)?;
        Ok(
            GuardedStream::new(std::io::Cursor::new(self.log.clone().into_bytes()), "fake-log")
                .into_byte_stream(),
        )
    }

    async fn list_files(
        &self,
        cluster: &Cluster,
        replica_name: &str,
        namespace: &str,
    ) -> Result<Vec<String>> {
        self.enter(cluster)?;
        self.find_replica(replica_name, namespace)?;
        let mut names: Vec<String> = self.files.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn download_file(
        &self,
        cluster: &Cluster,
        namespace: &str,
        replica_name: &str,
        file_name: &str,
    ) -> Result<ByteStream> {
        self.enter(cluster)?;
        self.find_replica(replica_name, namespace)?;
        let content = self
            .files
            .get(file_name)
            .cloned()
            .ok_or_else(|| ConsoleError::FileNotFound(file_name.to_string()))?;
        Ok(GuardedStream::new(std::io::Cursor::new(content), "fake-file").into_byte_stream())
    }

    async fn fetch_log(
        &self,
        cluster: &Cluster,
        replica_name: &str,
        namespace: &str,
    ) -> Result<String> {
        self.enter(cluster)?;
        self.find_replica(replica_name, namespace)?;
        Ok(self.log.clone())
    }

    async fn fetch_metrics(
        &self,
        cluster: &Cluster,
        namespace: &str,
    ) -> Result<Vec<RawMetricSnapshot>> {
        self.enter(cluster)?;
        Ok(self.metrics.get(namespace).cloned().unwrap_or_default())
    }
}

pub fn app(id: &str, name: &str) -> App {
    App {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub fn environment(id: &str, app_id: &str, tag: &str, cluster_id: &str, namespace: &str) -> Environment {
    Environment {
        id: id.to_string(),
        app_id: app_id.to_string(),
        tag: tag.to_string(),
        cluster_id: cluster_id.to_string(),
        namespace: namespace.to_string(),
        cpu_limit: "2".to_string(),
        memory_limit: "4294967296".to_string(),
    }
}

pub fn cluster(id: &str, name: &str, cluster_type: &str) -> Cluster {
    Cluster {
        id: id.to_string(),
        name: name.to_string(),
        cluster_type: cluster_type.to_string(),
        connection: serde_json::Value::Null,
    }
}

pub fn version(app_id: &str, version_name: &str, branch_name: &str) -> DeploymentVersion {
    DeploymentVersion {
        id: format!("{app_id}-{version_name}"),
        app_id: app_id.to_string(),
        version_name: version_name.to_string(),
        branch_name: branch_name.to_string(),
    }
}

pub fn member(app_id: &str, user_id: &str) -> AppMember {
    AppMember {
        app_id: app_id.to_string(),
        user_id: user_id.to_string(),
    }
}

pub fn replica(name: &str, namespace: &str, version_name: Option<&str>) -> ReplicaSnapshot {
    ReplicaSnapshot {
        name: name.to_string(),
        namespace: namespace.to_string(),
        state: ReplicaState::Running,
        started_at: None,
        ip: Some("10.0.0.1".to_string()),
        node: Some("node-a".to_string()),
        version_name: version_name.map(str::to_string),
        usage: None,
    }
}

pub fn raw_snapshot(name: &str, namespace: &str, cpu: &str, memory: &str) -> RawMetricSnapshot {
    RawMetricSnapshot {
        name: name.to_string(),
        namespace: namespace.to_string(),
        containers: vec![ContainerUsage {
            name: "main".to_string(),
            cpu: cpu.to_string(),
            memory: memory.to_string(),
        }],
    }
}
