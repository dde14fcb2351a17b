//! HTTP surface and configuration of the replica console binary

pub mod api;
pub mod config;
