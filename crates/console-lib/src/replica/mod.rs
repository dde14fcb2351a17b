//! Interactive replica access
//!
//! [`ReplicaDirectory`] lists replicas and resolves a replica name to the
//! records it belongs to, enforcing application rights on the way.
//! [`ReplicaOperations`] dispatches live operations to the resolved
//! cluster backend once resolution succeeded.
//!
//! Both are called by the web layer in front of the console; the
//! `replica-console` binary only runs the metrics jobs.

mod directory;
mod operations;

#[cfg(test)]
mod tests;

pub use directory::{ReplicaContext, ReplicaDirectory};
pub use operations::ReplicaOperations;
