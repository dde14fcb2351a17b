//! Error taxonomy for the replica console core

use thiserror::Error;

/// Result alias used across the console core
pub type Result<T, E = ConsoleError> = std::result::Result<T, E>;

/// Errors surfaced by replica operations, backends and the metrics pipeline
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// A mandatory input was blank or missing
    #[error("required field is missing: {0}")]
    RequiredField(&'static str),

    /// Caller has no access to the target application
    #[error("user {user_id} has no rights on application {app_id}")]
    Rights { user_id: String, app_id: String },

    /// Replica name decodes but does not point at a known application/environment
    #[error("replica name is invalid: {0}")]
    ReplicaNameInvalid(String),

    /// Replica name lacks the expected segment structure
    #[error("malformed replica name: {0}")]
    MalformedName(String),

    /// Replica name embeds the separator more than once
    #[error("ambiguous replica name: {0}")]
    AmbiguousName(String),

    /// No backend registered for the cluster type
    #[error("unsupported cluster type: {0}")]
    UnsupportedClusterType(String),

    /// Network, authentication or timeout failure talking to a cluster
    #[error("cluster {cluster} unavailable: {reason}")]
    BackendUnavailable { cluster: String, reason: String },

    #[error("replica not found: {0}")]
    ReplicaNotFound(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    /// File name would escape the inspection directory
    #[error("path traversal prevented: {0}")]
    PathTraversal(String),

    /// Resource quantity string could not be parsed
    #[error("invalid resource quantity: {0}")]
    InvalidQuantity(String),

    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    /// Failure inside an external record store
    #[error("store error: {0}")]
    Store(String),
}

impl ConsoleError {
    pub fn backend_unavailable(cluster: impl Into<String>, reason: impl ToString) -> Self {
        Self::BackendUnavailable {
            cluster: cluster.into(),
            reason: reason.to_string(),
        }
    }

    /// True for naming-convention and authorization failures, which are never retried
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::RequiredField(_)
                | Self::Rights { .. }
                | Self::ReplicaNameInvalid(_)
                | Self::MalformedName(_)
                | Self::AmbiguousName(_)
                | Self::PathTraversal(_)
        )
    }

    /// True when the targeted resource is absent on the backend
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ReplicaNotFound(_) | Self::FileNotFound(_))
    }
}
