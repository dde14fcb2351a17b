//! Core library of the replica console
//!
//! This crate provides:
//! - The replica naming convention and quantity parsing
//! - A pluggable cluster backend abstraction with a Kubernetes implementation
//! - Replica listing, resolution and live operations with rights checks
//! - The replica metrics collection and retention pipeline
//! - Health checks and observability

pub mod backend;
pub mod error;
pub mod health;
pub mod metrics;
pub mod models;
pub mod naming;
pub mod observability;
pub mod quantity;
pub mod replica;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{ConsoleError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use naming::NamingCodec;
pub use observability::{ConsoleMetrics, StructuredLogger};
