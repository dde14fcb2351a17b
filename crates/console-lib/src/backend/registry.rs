//! Static mapping from cluster-type tags to backends

use super::ClusterBackend;
use crate::error::{ConsoleError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Resolves a cluster-type tag to its backend. Immutable once built.
#[derive(Clone)]
pub struct BackendRegistry {
    backends: Arc<HashMap<String, Arc<dyn ClusterBackend>>>,
}

impl BackendRegistry {
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::new()
    }

    pub fn resolve(&self, cluster_type: &str) -> Result<Arc<dyn ClusterBackend>> {
        self.backends
            .get(cluster_type)
            .cloned()
            .ok_or_else(|| ConsoleError::UnsupportedClusterType(cluster_type.to_string()))
    }

    /// Registered cluster-type tags, sorted
    pub fn cluster_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.backends.keys().cloned().collect();
        types.sort();
        types
    }
}

/// Collects backends at startup
#[derive(Default)]
pub struct BackendRegistryBuilder {
    backends: HashMap<String, Arc<dyn ClusterBackend>>,
}

impl BackendRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its own cluster-type tag; a later
    /// registration for the same tag replaces the earlier one
    pub fn register(mut self, backend: Arc<dyn ClusterBackend>) -> Self {
        let cluster_type = backend.cluster_type().to_string();
        info!(cluster_type = %cluster_type, "Registered cluster backend");
        self.backends.insert(cluster_type, backend);
        self
    }

    pub fn build(self) -> BackendRegistry {
        BackendRegistry {
            backends: Arc::new(self.backends),
        }
    }
}
